// src/watch/reconcile.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::error::WatchError;
use crate::watch::option::ResourceOption;
use crate::watch::store::{NewResource, ResourceStore};
use crate::watch::types::{Candidate, ResourceKind};

/// How one candidate related to the tracked set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    New,
    SeenAndDue,
    SeenAndNotDue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub new: usize,
    pub seen_due: usize,
    pub seen_not_due: usize,
    /// Candidates whose claimed kind disagreed with the tracked kind.
    pub conflicts: usize,
    /// Candidates whose URL could not be canonicalised.
    pub rejected: usize,
    pub new_identities: Vec<String>,
}

impl ReconciliationReport {
    pub fn total(&self) -> usize {
        self.new + self.seen_due + self.seen_not_due + self.conflicts + self.rejected
    }

    pub fn has_new(&self) -> bool {
        self.new > 0
    }

    fn count(&mut self, class: Classification) {
        match class {
            Classification::New => self.new += 1,
            Classification::SeenAndDue => self.seen_due += 1,
            Classification::SeenAndNotDue => self.seen_not_due += 1,
        }
    }
}

/// Canonical identity for a URL: https, lowercase host without `www.`,
/// no fragment, no `utm_*` parameters, no trailing slash on non-root paths.
pub fn canonical_url(raw: &str) -> Result<String, WatchError> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed).map_err(|e| WatchError::parse(trimmed, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(WatchError::parse(trimmed, "not an http(s) url"));
    }
    if url.scheme() == "http" {
        url.set_scheme("https")
            .map_err(|_| WatchError::parse(trimmed, "cannot switch scheme"))?;
    }
    let host = url
        .host_str()
        .ok_or_else(|| WatchError::parse(trimmed, "missing host"))?
        .to_ascii_lowercase();
    if let Some(bare) = host.strip_prefix("www.") {
        let bare = bare.to_string();
        url.set_host(Some(&bare))
            .map_err(|e| WatchError::parse(trimmed, e))?;
    }
    url.set_fragment(None);
    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !k.starts_with("utm_"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    Ok(url.to_string())
}

impl ResourceStore {
    /// Classify one candidate and track it when new.
    fn reconcile_one(
        &mut self,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> Result<Classification, WatchError> {
        let identity = canonical_url(&candidate.url)?;
        if let Some(existing) = self.get(&identity) {
            if let Some(claimed) = candidate.kind {
                if claimed != existing.kind {
                    return Err(WatchError::Conflict {
                        identity,
                        tracked: existing.kind,
                        claimed,
                    });
                }
            }
            return Ok(if self.is_due(existing, now) {
                Classification::SeenAndDue
            } else {
                Classification::SeenAndNotDue
            });
        }
        self.upsert(
            &identity,
            NewResource {
                kind: ResourceKind::Content,
                tip: candidate.tip.trim(),
            },
            &ResourceOption::default(),
            now,
        );
        Ok(Classification::New)
    }

    /// Merge listing results into the store without duplicating identities.
    ///
    /// Seen resources are never modified, so repeating the same candidate set
    /// only ever reports them as seen.
    pub fn reconcile_candidates(
        &mut self,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();
        for candidate in candidates {
            match self.reconcile_one(candidate, now) {
                Ok(class) => {
                    if class == Classification::New {
                        if let Ok(id) = canonical_url(&candidate.url) {
                            report.new_identities.push(id);
                        }
                    }
                    report.count(class);
                }
                Err(e @ WatchError::Conflict { .. }) => {
                    tracing::warn!(target: "watch", error_kind = e.kind(), error = %e, "reconciliation conflict");
                    report.conflicts += 1;
                }
                Err(e) => {
                    tracing::warn!(target: "watch", url = %candidate.url, error_kind = e.kind(), error = %e, "candidate rejected");
                    report.rejected += 1;
                }
            }
        }
        tracing::info!(
            target: "watch",
            candidates = candidates.len(),
            new = report.new,
            seen_due = report.seen_due,
            seen_not_due = report.seen_not_due,
            conflicts = report.conflicts,
            rejected = report.rejected,
            "reconciled candidates"
        );
        report
    }
}
