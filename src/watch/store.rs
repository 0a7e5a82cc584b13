// src/watch/store.rs
use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::{Result, WatchError};
use crate::watch::cadence;
use crate::watch::option::{merge_options, OptionLayers, ResolvedOption, ResourceOption};
use crate::watch::resource::TrackedResource;
use crate::watch::types::ResourceKind;

/// In-memory index of every tracked resource, owned by one watcher.
///
/// Resources are kept ordered by `created_at`, insertion order on ties, which
/// is also the persisted order; `index` maps identity to position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceStore {
    resources: Vec<TrackedResource>,
    index: HashMap<String, usize>,
    layers: OptionLayers,
}

/// Fields used when an upsert has to create the resource.
#[derive(Debug, Clone)]
pub struct NewResource<'a> {
    pub kind: ResourceKind,
    pub tip: &'a str,
}

impl ResourceStore {
    pub fn new(layers: OptionLayers) -> Self {
        Self {
            resources: Vec::new(),
            index: HashMap::new(),
            layers,
        }
    }

    pub fn layers(&self) -> &OptionLayers {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, identity: &str) -> Option<&TrackedResource> {
        self.index.get(identity).map(|&i| &self.resources[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedResource> {
        self.resources.iter()
    }

    /// Effective option for a tracked resource.
    pub fn resolved(&self, resource: &TrackedResource) -> ResolvedOption {
        self.layers.resolve(resource.kind, &resource.option)
    }

    pub fn is_due(&self, resource: &TrackedResource, now: DateTime<Utc>) -> bool {
        cadence::is_due(resource, &self.resolved(resource), now)
    }

    /// Insert a new resource, or merge `option_override` into the existing one.
    ///
    /// An existing resource keeps its kind, tip, timestamps and version.
    pub fn upsert(
        &mut self,
        identity: &str,
        init: NewResource<'_>,
        option_override: &ResourceOption,
        now: DateTime<Utc>,
    ) -> &TrackedResource {
        if let Some(&i) = self.index.get(identity) {
            let existing = &mut self.resources[i];
            if !option_override.is_empty() {
                existing.option = merge_options(&existing.option, option_override);
            }
            return &self.resources[i];
        }
        let mut resource = TrackedResource::new(identity, init.kind, init.tip, now);
        resource.option = option_override.clone();
        self.push(resource)
    }

    fn push(&mut self, resource: TrackedResource) -> &TrackedResource {
        let created = resource.created_at;
        let i = self.resources.partition_point(|r| r.created_at <= created);
        self.resources.insert(i, resource);
        if i + 1 == self.resources.len() {
            self.index.insert(self.resources[i].identity.clone(), i);
        } else {
            for (pos, r) in self.resources.iter().enumerate().skip(i) {
                self.index.insert(r.identity.clone(), pos);
            }
        }
        &self.resources[i]
    }

    /// Apply the outcome of a successful check to one resource.
    /// Returns false when the identity is not tracked.
    pub fn record_check(&mut self, identity: &str, now: DateTime<Utc>, changed: bool) -> bool {
        match self.index.get(identity) {
            Some(&i) => {
                self.resources[i].record_check(now, changed);
                true
            }
            None => false,
        }
    }

    /// Due resources of `kind`, highest priority first, store order on ties.
    pub fn due_resources(&self, kind: ResourceKind, now: DateTime<Utc>) -> Vec<&TrackedResource> {
        let mut due: Vec<(f64, &TrackedResource)> = self
            .resources
            .iter()
            .filter(|r| r.kind == kind)
            .filter_map(|r| {
                let opt = self.resolved(r);
                cadence::is_due(r, &opt, now).then(|| (cadence::priority_weight(r, &opt, now), r))
            })
            .collect();
        // sort_by is stable, so equal weights keep store order
        due.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        due.into_iter().map(|(_, r)| r).collect()
    }

    /// Resources in persistence order: `created_at` ascending, insertion order on ties.
    pub fn ordered(&self) -> Vec<&TrackedResource> {
        self.resources.iter().collect()
    }

    pub fn to_snapshot(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.ordered()).map_err(|e| WatchError::StoreIo {
            path: "<memory>".into(),
            message: format!("serialize tracked state: {e}"),
        })
    }

    /// Rebuild a store from a snapshot. Later duplicates of an identity are dropped.
    pub fn from_snapshot(snapshot: &str, layers: OptionLayers) -> Result<Self> {
        let records: Vec<TrackedResource> = if snapshot.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(snapshot).map_err(|e| WatchError::StoreIo {
                path: "<memory>".into(),
                message: format!("parse tracked state: {e}"),
            })?
        };
        let mut store = Self::new(layers);
        for record in records {
            if store.index.contains_key(&record.identity) {
                tracing::warn!(
                    target: "watch",
                    identity = %record.identity,
                    "duplicate identity in tracked state, keeping the first record"
                );
                continue;
            }
            store.push(record);
        }
        Ok(store)
    }

    /// Write the snapshot next to `path` and rename it into place.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let body = self.to_snapshot().map_err(|e| match e {
            WatchError::StoreIo { message, .. } => WatchError::store_io(path, message),
            other => other,
        })?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body.as_bytes())
            .await
            .map_err(|e| WatchError::store_io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| WatchError::store_io(path, e))?;
        tracing::debug!(target: "watch", path = %path.display(), resources = self.len(), "tracked state saved");
        Ok(())
    }

    pub async fn restore(path: &Path, layers: OptionLayers) -> Result<Self> {
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WatchError::store_io(path, e))?;
        Self::from_snapshot(&body, layers).map_err(|e| match e {
            WatchError::StoreIo { message, .. } => WatchError::store_io(path, message),
            other => other,
        })
    }
}
