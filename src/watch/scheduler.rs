//! One scheduler pass over the currently due resources.
//!
//! A [`Pass`] is driven by repeatedly awaiting [`Pass::next_batch`]: first
//! every due listing resource is checked on its own (one report each), then
//! the due content resources are fetched in fixed-size batches (one report
//! per batch, the last one possibly partial). The store is persisted after
//! every report; a persistence failure ends the pass with an error.
//!
//! Dropping the pass between awaits abandons it cleanly: per-resource updates
//! are only applied after a successful fetch, and the persisted state only
//! ever contains fully completed units.

use std::path::Path;
use std::time::{Duration as StdDuration, Instant};

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use rand::Rng;
use serde::Serialize;

use crate::error::{Result, WatchError};
use crate::watch::resource::TrackedResource;
use crate::watch::store::ResourceStore;
use crate::watch::types::{Fetcher, Materializer, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSettings {
    pub batch_size: usize,
    /// Jittered pause range in seconds between units of work.
    pub pause_secs: (u64, u64),
}

impl Default for PassSettings {
    fn default() -> Self {
        Self {
            batch_size: 3,
            pause_secs: (5, 10),
        }
    }
}

/// What one emitted unit of work covered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub kind: Option<ResourceKind>,
    /// Commit label for the snapshot sink.
    pub label: String,
    pub identities: Vec<String>,
    pub succeeded: usize,
    pub failed: usize,
    /// Resources that vanished from the store before they could be checked.
    pub skipped: usize,
    pub new_resources: usize,
    pub changed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub batches: usize,
    pub listing_checked: usize,
    pub content_checked: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tracked resources that were not due in this pass.
    pub skipped: usize,
    pub new_resources: usize,
    pub changed: usize,
}

impl PassSummary {
    fn absorb(&mut self, report: &BatchReport) {
        self.batches += 1;
        match report.kind {
            Some(ResourceKind::Listing) => self.listing_checked += report.identities.len(),
            Some(ResourceKind::Content) => self.content_checked += report.identities.len(),
            None => {}
        }
        self.succeeded += report.succeeded;
        self.failed += report.failed;
        self.new_resources += report.new_resources;
        self.changed += report.changed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Listing,
    Content,
    Done,
}

/// A single, non-restartable pass. Create a new one for every run.
pub struct Pass<'w> {
    store: &'w mut ResourceStore,
    fetcher: &'w dyn Fetcher,
    materializer: &'w dyn Materializer,
    state_path: &'w Path,
    settings: PassSettings,
    phase: Phase,
    listing_queue: Vec<String>,
    content_batches: Vec<Vec<String>>,
    cursor: usize,
    content_total: usize,
    summary: PassSummary,
}

impl<'w> Pass<'w> {
    pub fn new(
        store: &'w mut ResourceStore,
        fetcher: &'w dyn Fetcher,
        materializer: &'w dyn Materializer,
        state_path: &'w Path,
        settings: PassSettings,
    ) -> Self {
        crate::watch::ensure_metrics_described();
        Self {
            store,
            fetcher,
            materializer,
            state_path,
            settings,
            phase: Phase::Start,
            listing_queue: Vec::new(),
            content_batches: Vec::new(),
            cursor: 0,
            content_total: 0,
            summary: PassSummary::default(),
        }
    }

    pub fn summary(&self) -> &PassSummary {
        &self.summary
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Run the next unit of work. `Ok(None)` once the pass is finished.
    pub async fn next_batch(&mut self) -> Result<Option<BatchReport>> {
        loop {
            match self.phase {
                Phase::Start => {
                    let now = Utc::now();
                    self.listing_queue = self
                        .store
                        .due_resources(ResourceKind::Listing, now)
                        .into_iter()
                        .map(|r| r.identity.clone())
                        .collect();
                    tracing::info!(target: "watch", due = self.listing_queue.len(), "checking listers");
                    self.cursor = 0;
                    self.phase = Phase::Listing;
                }
                Phase::Listing => {
                    let Some(identity) = self.listing_queue.get(self.cursor).cloned() else {
                        self.start_content_phase();
                        continue;
                    };
                    self.cursor += 1;
                    self.pause_between().await;
                    let report = self
                        .check_listing(&identity, self.cursor, self.listing_queue.len())
                        .await?;
                    self.summary.absorb(&report);
                    return Ok(Some(report));
                }
                Phase::Content => {
                    let Some(batch) = self.content_batches.get(self.cursor).cloned() else {
                        self.finish();
                        continue;
                    };
                    self.cursor += 1;
                    self.pause_between().await;
                    let report = self.check_content_batch(&batch).await?;
                    self.summary.absorb(&report);
                    return Ok(Some(report));
                }
                Phase::Done => return Ok(None),
            }
        }
    }

    fn start_content_phase(&mut self) {
        let now = Utc::now();
        let due: Vec<String> = self
            .store
            .due_resources(ResourceKind::Content, now)
            .into_iter()
            .map(|r| r.identity.clone())
            .collect();
        tracing::info!(target: "watch", due = due.len(), batch_size = self.settings.batch_size, "checking pages");
        self.content_total = due.len();
        if due.is_empty() {
            self.finish();
            return;
        }
        let size = self.settings.batch_size.max(1);
        self.content_batches = due.chunks(size).map(<[String]>::to_vec).collect();
        self.cursor = 0;
        self.phase = Phase::Content;
    }

    fn finish(&mut self) {
        let attempted = self.summary.listing_checked + self.summary.content_checked;
        self.summary.skipped = self.store.len().saturating_sub(attempted);
        self.phase = Phase::Done;
        gauge!("watch_last_pass_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "watch",
            succeeded = self.summary.succeeded,
            failed = self.summary.failed,
            skipped = self.summary.skipped,
            new = self.summary.new_resources,
            changed = self.summary.changed,
            "pass finished"
        );
    }

    async fn pause_between(&self) {
        if self.summary.batches == 0 {
            return;
        }
        let pause = jittered_pause(self.settings.pause_secs);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    async fn check_listing(
        &mut self,
        identity: &str,
        index: usize,
        total: usize,
    ) -> Result<BatchReport> {
        let mut report = BatchReport {
            kind: Some(ResourceKind::Listing),
            identities: vec![identity.to_string()],
            ..Default::default()
        };
        let Some(resource) = self.store.get(identity).cloned() else {
            report.skipped = 1;
            report.label = format!("check lister {index}/{total}, {identity}");
            return Ok(report);
        };
        let option = self.store.resolved(&resource);

        let t0 = Instant::now();
        let fetched = self.fetcher.fetch_listing(&resource, &option).await;
        histogram!("watch_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("watch_checks_total").increment(1);

        match fetched {
            Ok(mut candidates) => {
                if let Some(limit) = option.limit {
                    candidates.truncate(limit);
                }
                let now = Utc::now();
                let rec = self.store.reconcile_candidates(&candidates, now);
                self.store.record_check(identity, now, rec.has_new());
                counter!("watch_new_resources_total").increment(rec.new as u64);
                report.succeeded = 1;
                report.new_resources = rec.new;
                report.changed = usize::from(rec.has_new());
                tracing::info!(
                    target: "watch",
                    identity,
                    progress = %format!("{index}/{total}"),
                    candidates = candidates.len(),
                    new = rec.new,
                    "lister checked"
                );
            }
            Err(e) => {
                log_failure(&resource, &e);
                report.failed = 1;
            }
        }

        self.store.persist(self.state_path).await?;
        report.label = format!("check lister {index}/{total}, {}", resource.brief_tip());
        Ok(report)
    }

    async fn check_content_batch(&mut self, batch: &[String]) -> Result<BatchReport> {
        let mut report = BatchReport {
            kind: Some(ResourceKind::Content),
            identities: batch.to_vec(),
            ..Default::default()
        };
        let mut tips = Vec::with_capacity(batch.len());
        let done_before = self.summary.content_checked;

        for (offset, identity) in batch.iter().enumerate() {
            let Some(resource) = self.store.get(identity).cloned() else {
                report.skipped += 1;
                continue;
            };
            tips.push(resource.brief_tip());

            let t0 = Instant::now();
            let outcome = self.check_content(&resource).await;
            histogram!("watch_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
            counter!("watch_checks_total").increment(1);

            match outcome {
                Ok(changed) => {
                    self.store.record_check(identity, Utc::now(), changed);
                    report.succeeded += 1;
                    if changed {
                        report.changed += 1;
                        counter!("watch_versions_total").increment(1);
                    }
                    tracing::info!(
                        target: "watch",
                        identity = %identity,
                        progress = %format!("{}/{}", done_before + offset + 1, self.content_total),
                        changed,
                        "page checked"
                    );
                }
                Err(e) => {
                    log_failure(&resource, &e);
                    report.failed += 1;
                }
            }
        }

        self.store.persist(self.state_path).await?;
        report.label = format!("save {} pages, {}", batch.len(), tips.join(","));
        Ok(report)
    }

    /// Fetch and materialize one page. `Ok(true)` when its content changed.
    async fn check_content(&self, resource: &TrackedResource) -> Result<bool> {
        let record = self.fetcher.fetch_content(resource).await?;
        let stored = self
            .materializer
            .write(resource, &record, resource.version + 1)
            .await?;
        tracing::debug!(target: "watch", identity = %resource.identity, path = %stored.path.display(), "materialized");
        Ok(!stored.previous_equal)
    }
}

fn log_failure(resource: &TrackedResource, err: &WatchError) {
    counter!("watch_check_errors_total").increment(1);
    tracing::warn!(
        target: "watch",
        identity = %resource.identity,
        kind = ?resource.kind,
        error_kind = err.kind(),
        error = %err,
        "check failed, will retry next pass"
    );
}

fn jittered_pause((min, max): (u64, u64)) -> StdDuration {
    if max <= min {
        return StdDuration::from_secs(min);
    }
    let secs = rand::rng().random_range(min as f64..=max as f64);
    StdDuration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_stays_in_range() {
        for _ in 0..50 {
            let p = jittered_pause((1, 2));
            assert!(p >= StdDuration::from_secs(1) && p <= StdDuration::from_secs(2));
        }
        assert_eq!(jittered_pause((0, 0)), StdDuration::ZERO);
        assert_eq!(jittered_pause((3, 1)), StdDuration::from_secs(3));
    }

    #[test]
    fn summary_absorbs_reports_by_kind() {
        let mut s = PassSummary::default();
        s.absorb(&BatchReport {
            kind: Some(ResourceKind::Content),
            identities: vec!["a".into(), "b".into()],
            succeeded: 1,
            failed: 1,
            changed: 1,
            ..Default::default()
        });
        s.absorb(&BatchReport {
            kind: Some(ResourceKind::Listing),
            identities: vec!["l".into()],
            succeeded: 1,
            new_resources: 4,
            ..Default::default()
        });
        assert_eq!(s.batches, 2);
        assert_eq!(s.content_checked, 2);
        assert_eq!(s.listing_checked, 1);
        assert_eq!(s.failed, 1);
        assert_eq!(s.new_resources, 4);
    }
}
