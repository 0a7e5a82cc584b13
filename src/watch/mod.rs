// src/watch/mod.rs
pub mod cadence;
pub mod config;
pub mod option;
pub mod reconcile;
pub mod resource;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod types;

use std::path::{Path, PathBuf};

use chrono::Utc;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::{Result, WatchError};
use crate::fetch::HttpFetcher;
use crate::materialize::MarkdownMaterializer;
use crate::watch::config::{load_config_for, WatcherConfig};
use crate::watch::reconcile::canonical_url;
use crate::watch::scheduler::{Pass, PassSettings, PassSummary};
use crate::watch::snapshot::{GitSink, LogSink};
use crate::watch::store::{NewResource, ResourceStore};
use crate::watch::types::{Fetcher, Materializer, ResourceKind, SnapshotSink};

/// Tracked-state document inside a watcher directory.
pub const STATE_FILE: &str = ".tasks.json";

/// One-time metrics registration (so series show up once an exporter is installed).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("watch_checks_total", "Resource checks attempted.");
        describe_counter!(
            "watch_check_errors_total",
            "Resource checks that failed to fetch or materialize."
        );
        describe_counter!(
            "watch_new_resources_total",
            "Resources first discovered by a listing check."
        );
        describe_counter!(
            "watch_versions_total",
            "Content versions written after a change."
        );
        describe_histogram!("watch_fetch_ms", "Fetch + process time per resource in milliseconds.");
        describe_gauge!("watch_last_pass_ts", "Unix ts when the last pass finished.");
    });
}

/// The external collaborators a watcher drives.
pub struct Collaborators {
    pub fetcher: Box<dyn Fetcher>,
    pub materializer: Box<dyn Materializer>,
    pub sink: Box<dyn SnapshotSink>,
}

/// A directory holding a configuration document, the tracked state and
/// the archived Markdown output. Owns its store exclusively.
pub struct Watcher {
    dir: PathBuf,
    state_path: PathBuf,
    config: WatcherConfig,
    store: ResourceStore,
    collaborators: Collaborators,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatcherReport {
    pub dir: String,
    pub tracked: usize,
    pub listing: usize,
    pub content: usize,
    pub due_listing: usize,
    pub due_content: usize,
    pub markdown_files: usize,
    /// `git log --oneline` lines, newest first; empty without version control.
    pub recent_commits: Vec<String>,
}

/// Commits listed in a report when version control is configured.
const REPORTED_COMMITS: usize = 5;

/// Repository the snapshot sink commits into, when version control is on.
fn commit_repo(path: &Path, config: &WatcherConfig) -> Option<PathBuf> {
    config.version_control.as_ref().map(|vc| {
        vc.git_commit_path
            .as_ref()
            .map(|p| path.join(p))
            .unwrap_or_else(|| path.to_path_buf())
    })
}

/// Restore the tracked state and merge the configured listers, in memory only.
/// A missing state file is an empty store.
async fn load_tracked(path: &Path, config: &WatcherConfig) -> Result<ResourceStore> {
    if !path.is_dir() {
        return Err(WatchError::Config(format!(
            "watcher directory {} does not exist",
            path.display()
        )));
    }
    config.validate()?;

    let state_path = path.join(STATE_FILE);
    let mut store = if state_path.exists() {
        ResourceStore::restore(&state_path, config.layers()).await?
    } else {
        ResourceStore::new(config.layers())
    };

    let now = Utc::now();
    for lister in &config.listers {
        let identity = canonical_url(&lister.url)
            .map_err(|e| WatchError::Config(format!("lister url `{}`: {e}", lister.url)))?;
        let tracked = store.upsert(
            &identity,
            NewResource {
                kind: ResourceKind::Listing,
                tip: &lister.tip,
            },
            &lister.option,
            now,
        );
        if tracked.kind != ResourceKind::Listing {
            let conflict = WatchError::Conflict {
                identity: identity.clone(),
                tracked: tracked.kind,
                claimed: ResourceKind::Listing,
            };
            tracing::warn!(target: "watch", error_kind = conflict.kind(), error = %conflict, "configured lister already tracked");
        }
    }
    Ok(store)
}

async fn build_report(dir: &Path, config: &WatcherConfig, store: &ResourceStore) -> WatcherReport {
    let now = Utc::now();
    let count = |kind| store.iter().filter(|r| r.kind == kind).count();
    let out_dir = dir.join(&config.options.output_path);
    let markdown_files = std::fs::read_dir(&out_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("md"))
                .count()
        })
        .unwrap_or(0);
    let recent_commits = match commit_repo(dir, config) {
        Some(repo) => GitSink::new(repo)
            .recent_commits(REPORTED_COMMITS)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(target: "watch", dir = %dir.display(), error = %format!("{e:#}"), "cannot read recent commits");
                Vec::new()
            }),
        None => Vec::new(),
    };
    WatcherReport {
        dir: dir.display().to_string(),
        tracked: store.len(),
        listing: count(ResourceKind::Listing),
        content: count(ResourceKind::Content),
        due_listing: store.due_resources(ResourceKind::Listing, now).len(),
        due_content: store.due_resources(ResourceKind::Content, now).len(),
        markdown_files,
        recent_commits,
    }
}

impl Watcher {
    /// Open a watcher with the HTTP fetcher, Markdown output and the
    /// configured snapshot sink.
    pub async fn open(path: &Path) -> Result<Self> {
        let config = load_config_for(path)?;
        let fetcher = HttpFetcher::new(&config.fetch, path)?;
        let materializer = MarkdownMaterializer::new(path.join(&config.options.output_path));
        let sink: Box<dyn SnapshotSink> = match commit_repo(path, &config) {
            Some(repo) => Box::new(GitSink::new(repo)),
            None => Box::new(LogSink),
        };
        let collaborators = Collaborators {
            fetcher: Box::new(fetcher),
            materializer: Box::new(materializer),
            sink,
        };
        Self::open_with(path, config, collaborators).await
    }

    /// Open with an already loaded configuration and explicit collaborators.
    /// Creates or rewrites the state file.
    pub async fn open_with(
        path: &Path,
        config: WatcherConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let store = load_tracked(path, &config).await?;
        let state_path = path.join(STATE_FILE);
        store.persist(&state_path).await?;

        let watcher = Self {
            dir: path.to_path_buf(),
            state_path,
            config,
            store,
            collaborators,
        };
        tracing::info!(
            target: "watch",
            dir = %watcher.dir.display(),
            tracked = watcher.store.len(),
            listers = watcher.config.listers.len(),
            "watcher opened"
        );
        Ok(watcher)
    }

    /// Report on a watcher directory without writing anything to it.
    pub async fn inspect(path: &Path) -> Result<WatcherReport> {
        let config = load_config_for(path)?;
        let store = load_tracked(path, &config).await?;
        Ok(build_report(path, &config, &store).await)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    pub fn settings(&self) -> PassSettings {
        PassSettings {
            batch_size: self.config.options.batch_size,
            pause_secs: self.config.options.pause_secs,
        }
    }

    /// Start a fresh pass over the currently due resources.
    pub fn run(&mut self) -> Pass<'_> {
        let settings = self.settings();
        Pass::new(
            &mut self.store,
            self.collaborators.fetcher.as_ref(),
            self.collaborators.materializer.as_ref(),
            &self.state_path,
            settings,
        )
    }

    /// Drain one pass, checkpointing each report through the snapshot sink.
    pub async fn watch_once(&mut self) -> Result<PassSummary> {
        tracing::info!(target: "watch", dir = %self.dir.display(), tracked = self.store.len(), "pass started");
        let settings = self.settings();
        let mut pass = Pass::new(
            &mut self.store,
            self.collaborators.fetcher.as_ref(),
            self.collaborators.materializer.as_ref(),
            &self.state_path,
            settings,
        );
        let sink = self.collaborators.sink.as_ref();
        while let Some(report) = pass.next_batch().await? {
            if let Err(e) = sink.commit(&report.label).await {
                tracing::warn!(target: "watch", label = %report.label, error = %format!("{e:#}"), "snapshot commit failed");
            }
        }
        Ok(pass.summary().clone())
    }

    pub async fn report(&self) -> WatcherReport {
        build_report(&self.dir, &self.config, &self.store).await
    }
}
