// src/watch/types.rs
use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::watch::option::ResolvedOption;
use crate::watch::resource::TrackedResource;

/// Listing resources yield candidates; content resources yield a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Listing,
    Content,
}

/// Site/format kind, resolved once when a resource is first tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// RSS feed enumerating articles.
    Feed,
    /// HTML page whose links point at articles.
    LinkIndex,
    /// A single HTML document.
    Article,
}

impl ContentKind {
    pub fn resolve(url: &str, kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Content => ContentKind::Article,
            ResourceKind::Listing => {
                let lower = url.to_ascii_lowercase();
                let path = lower.split(['?', '#']).next().unwrap_or_default();
                let looks_like_feed = path.ends_with(".xml")
                    || path.ends_with(".rss")
                    || path.ends_with("/feed")
                    || path.ends_with("/rss")
                    || path.contains("/feed/");
                if looks_like_feed {
                    ContentKind::Feed
                } else {
                    ContentKind::LinkIndex
                }
            }
        }
    }
}

/// A URL discovered by a listing check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    #[serde(default)]
    pub tip: String,
    /// Kind the listing claims for this URL; `None` means content.
    #[serde(default)]
    pub kind: Option<ResourceKind>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn new(url: impl Into<String>, tip: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tip: tip.into(),
            ..Default::default()
        }
    }
}

/// Structured document produced by a content fetch. `body` is Markdown.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentRecord {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Result of materializing one content record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub path: PathBuf,
    /// True when the previously stored version has identical content.
    pub previous_equal: bool,
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_listing(
        &self,
        resource: &TrackedResource,
        option: &ResolvedOption,
    ) -> Result<Vec<Candidate>>;

    async fn fetch_content(&self, resource: &TrackedResource) -> Result<ContentRecord>;
}

#[async_trait::async_trait]
pub trait Materializer: Send + Sync {
    /// Store `record` as `version` unless the previous version is identical.
    async fn write(
        &self,
        resource: &TrackedResource,
        record: &ContentRecord,
        version: u64,
    ) -> Result<Materialized>;
}

#[async_trait::async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Best-effort durability checkpoint of the output directory.
    async fn commit(&self, label: &str) -> anyhow::Result<()>;
}
