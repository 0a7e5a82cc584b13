// src/watch/snapshot.rs
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::process::Command;

use crate::watch::types::SnapshotSink;

/// Commits the output directory into a git repository after each batch.
pub struct GitSink {
    repo: PathBuf,
}

impl GitSink {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .output()
            .await
            .with_context(|| format!("running git {} in {}", args.join(" "), self.repo.display()))
    }

    /// The last `n` commits as `git log --oneline` lines, newest first.
    pub async fn recent_commits(&self, n: usize) -> Result<Vec<String>> {
        let count = n.to_string();
        let log = self.git(&["log", "--oneline", "-n", &count]).await?;
        if !log.status.success() {
            bail!("git log failed: {}", String::from_utf8_lossy(&log.stderr).trim());
        }
        Ok(String::from_utf8_lossy(&log.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[async_trait::async_trait]
impl SnapshotSink for GitSink {
    async fn commit(&self, label: &str) -> Result<()> {
        let add = self.git(&["add", "."]).await?;
        if !add.status.success() {
            bail!("git add failed: {}", String::from_utf8_lossy(&add.stderr).trim());
        }
        let commit = self.git(&["commit", "-m", label]).await?;
        if !commit.status.success() {
            // "nothing to commit" lands on stdout with a non-zero status
            let stdout = String::from_utf8_lossy(&commit.stdout);
            if stdout.contains("nothing to commit") {
                tracing::debug!(target: "watch", label, "nothing to commit");
                return Ok(());
            }
            bail!(
                "git commit failed: {}",
                String::from_utf8_lossy(&commit.stderr).trim()
            );
        }
        tracing::info!(target: "watch", label, "git committed");
        Ok(())
    }
}

/// Used when no version control is configured: the label is only logged.
pub struct LogSink;

#[async_trait::async_trait]
impl SnapshotSink for LogSink {
    async fn commit(&self, label: &str) -> Result<()> {
        tracing::info!(target: "watch", label, "checkpoint");
        Ok(())
    }
}

// --- Test helper ---
pub struct MemorySink {
    pub labels: std::sync::Mutex<Vec<String>>,
    pub fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            labels: std::sync::Mutex::new(vec![]),
            fail: false,
        }
    }

    /// A sink that records labels and then reports failure.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SnapshotSink for MemorySink {
    async fn commit(&self, label: &str) -> Result<()> {
        if let Ok(mut v) = self.labels.lock() {
            v.push(label.to_string());
        }
        if self.fail {
            bail!("snapshot sink unavailable");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sink_records_labels() {
        let sink = MemorySink::new();
        sink.commit("check lister 1/1").await.unwrap();
        assert_eq!(sink.labels(), vec!["check lister 1/1".to_string()]);

        let failing = MemorySink::failing();
        assert!(failing.commit("x").await.is_err());
        assert_eq!(failing.labels().len(), 1);
    }

    #[tokio::test]
    async fn git_sink_errors_outside_a_repository() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = GitSink::new(tmp.path().join("does-not-exist"));
        assert!(sink.commit("label").await.is_err());
        assert!(sink.recent_commits(5).await.is_err());
    }

    #[tokio::test]
    async fn recent_commits_lists_the_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = GitSink::new(tmp.path());
        for args in [
            &["init", "-q"][..],
            &["config", "user.email", "watcher@example.com"][..],
            &["config", "user.name", "watcher"][..],
            &["config", "commit.gpgsign", "false"][..],
        ] {
            assert!(sink.git(args).await.unwrap().status.success());
        }
        for i in 0..7 {
            std::fs::write(tmp.path().join("page.md"), format!("v{i}")).unwrap();
            sink.commit(&format!("check page {i}")).await.unwrap();
        }

        let log = sink.recent_commits(5).await.unwrap();
        assert_eq!(log.len(), 5);
        assert!(log[0].ends_with("check page 6"), "{log:?}");
        assert!(log[4].ends_with("check page 2"), "{log:?}");
    }
}
