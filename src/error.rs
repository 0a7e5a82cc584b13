//! Error taxonomy for the watcher core.
//!
//! Per-resource failures (`Fetch`, `Parse`, `Output`) are recovered inside a pass,
//! `Conflict` is only ever surfaced as a warning, and `StoreIo` / `Config`
//! are fatal to whatever operation raised them.

use crate::watch::types::ResourceKind;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Network, HTTP status or auth failure talking to a remote page.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The payload was fetched but could not be interpreted.
    #[error("parse failed for {url}: {message}")]
    Parse { url: String, message: String },

    /// A candidate claims a different kind than the tracked resource.
    #[error("{identity} is tracked as {tracked:?} but was offered as {claimed:?}")]
    Conflict {
        identity: String,
        tracked: ResourceKind,
        claimed: ResourceKind,
    },

    /// Writing an archived document failed. Recovered like a fetch failure.
    #[error("output error at {path}: {message}")]
    Output { path: String, message: String },

    /// Reading or writing the tracked-state document failed.
    #[error("store io error at {path}: {message}")]
    StoreIo { path: String, message: String },

    /// The configuration document is missing or malformed.
    #[error("config error: {0}")]
    Config(String),
}

impl WatchError {
    pub fn fetch(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn output(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::Output {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    pub fn store_io(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::StoreIo {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Short stable name used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Parse { .. } => "parse",
            Self::Conflict { .. } => "conflict",
            Self::Output { .. } => "output",
            Self::StoreIo { .. } => "store_io",
            Self::Config(_) => "config",
        }
    }

    /// Fatal errors abort the current pass (or construction) and propagate.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreIo { .. } | Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_fetch_includes_url() {
        let err = WatchError::fetch("https://example.com/a", "status 503");
        assert_eq!(
            err.to_string(),
            "fetch failed for https://example.com/a: status 503"
        );
        assert_eq!(err.kind(), "fetch");
        assert!(!err.is_fatal());
    }

    #[test]
    fn store_and_config_errors_are_fatal() {
        let io = WatchError::store_io(std::path::Path::new("/tmp/x"), "disk full");
        assert!(io.is_fatal());
        assert!(WatchError::Config("batch_size must be >= 1".into()).is_fatal());
        assert!(!WatchError::parse("u", "bad").is_fatal());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WatchError>();
    }
}
