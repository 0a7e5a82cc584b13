// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use page_watcher::watch::option::ResolvedOption;
use page_watcher::watch::resource::TrackedResource;
use page_watcher::watch::snapshot::MemorySink;
use page_watcher::watch::types::{
    Candidate, ContentRecord, Fetcher, Materialized, Materializer, SnapshotSink,
};
use page_watcher::{Result, WatchError};

/// Fetcher answering from fixed tables and logging every request.
#[derive(Default)]
pub struct ScriptedFetcher {
    pub listings: HashMap<String, Vec<Candidate>>,
    pub pages: HashMap<String, ContentRecord>,
    pub failing: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn with_listing(mut self, url: &str, items: &[&str]) -> Self {
        let candidates = items
            .iter()
            .map(|u| Candidate::new(*u, format!("tip for {u}")))
            .collect();
        self.listings.insert(url.to_string(), candidates);
        self
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            ContentRecord {
                title: format!("Title of {url}"),
                body: body.to_string(),
                ..Default::default()
            },
        );
        self
    }

    pub fn failing_on(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn log(&self, url: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }
        if self.failing.contains(url) {
            return Err(WatchError::fetch(url, "connection reset"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch_listing(
        &self,
        resource: &TrackedResource,
        _option: &ResolvedOption,
    ) -> Result<Vec<Candidate>> {
        self.log(&resource.identity)?;
        Ok(self
            .listings
            .get(&resource.identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_content(&self, resource: &TrackedResource) -> Result<ContentRecord> {
        self.log(&resource.identity)?;
        self.pages
            .get(&resource.identity)
            .cloned()
            .ok_or_else(|| WatchError::fetch(&resource.identity, "status 404 Not Found"))
    }
}

/// Materializer keeping the last body per identity in memory.
#[derive(Default)]
pub struct MemoryMaterializer {
    pub stored: Mutex<HashMap<String, (String, u64)>>,
}

impl MemoryMaterializer {
    pub fn version_of(&self, identity: &str) -> Option<u64> {
        self.stored
            .lock()
            .ok()
            .and_then(|m| m.get(identity).map(|(_, v)| *v))
    }
}

#[async_trait::async_trait]
impl Materializer for MemoryMaterializer {
    async fn write(
        &self,
        resource: &TrackedResource,
        record: &ContentRecord,
        version: u64,
    ) -> Result<Materialized> {
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| WatchError::output(std::path::Path::new("<memory>"), "poisoned"))?;
        let previous_equal = stored
            .get(&resource.identity)
            .is_some_and(|(body, _)| body == &record.body);
        if !previous_equal {
            stored.insert(resource.identity.clone(), (record.body.clone(), version));
        }
        Ok(Materialized {
            path: format!("{}.md", resource.identity).into(),
            previous_equal,
        })
    }
}

/// Lets a test keep a handle on the sink it hands to a watcher.
pub struct SharedSink(pub Arc<MemorySink>);

#[async_trait::async_trait]
impl SnapshotSink for SharedSink {
    async fn commit(&self, label: &str) -> anyhow::Result<()> {
        self.0.commit(label).await
    }
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}
