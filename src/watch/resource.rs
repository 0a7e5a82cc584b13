// src/watch/resource.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::watch::option::ResourceOption;
use crate::watch::types::{ContentKind, ResourceKind};

/// Persisted scheduling state for one tracked URL.
///
/// `identity` is the canonical URL and never changes. Timestamps and
/// `version` are only touched through [`TrackedResource::record_check`],
/// which the scheduler calls after a successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedResource {
    pub identity: String,
    pub kind: ResourceKind,
    pub content_kind: ContentKind,
    #[serde(default)]
    pub tip: String,
    /// This resource's own option layer (global and kind layers are resolved later).
    #[serde(default, skip_serializing_if = "ResourceOption::is_empty")]
    pub option: ResourceOption,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl TrackedResource {
    pub fn new(
        identity: impl Into<String>,
        kind: ResourceKind,
        tip: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let identity = identity.into();
        let content_kind = ContentKind::resolve(&identity, kind);
        Self {
            identity,
            kind,
            content_kind,
            tip: tip.into(),
            option: ResourceOption::default(),
            created_at,
            last_checked_at: None,
            last_modified_at: None,
            version: 0,
        }
    }

    pub fn is_listing(&self) -> bool {
        self.kind == ResourceKind::Listing
    }

    pub fn is_content(&self) -> bool {
        self.kind == ResourceKind::Content
    }

    /// Apply the outcome of one successful check at `now`.
    /// A change bumps `version` and moves `last_modified_at` to `now`.
    pub fn record_check(&mut self, now: DateTime<Utc>, changed: bool) {
        self.last_checked_at = Some(now);
        if changed {
            self.last_modified_at = Some(now);
            self.version += 1;
        }
    }

    /// Short label for commit messages and logs.
    pub fn brief_tip(&self) -> String {
        let label = if self.tip.trim().is_empty() {
            self.identity.as_str()
        } else {
            self.tip.trim()
        };
        if label.chars().count() > 30 {
            let mut s: String = label.chars().take(30).collect();
            s.push('…');
            s
        } else {
            label.to_string()
        }
    }
}
