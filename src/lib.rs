// src/lib.rs
// Public library surface for the CLI and integration tests.

pub mod error;
pub mod fetch;
pub mod materialize;
pub mod watch;

// ---- Re-exports for stable public API ----
pub use crate::error::{Result, WatchError};
pub use crate::watch::scheduler::{BatchReport, Pass, PassSettings, PassSummary};
pub use crate::watch::store::ResourceStore;
pub use crate::watch::{Collaborators, Watcher, WatcherReport};
