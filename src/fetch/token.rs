// src/fetch/token.rs
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};

/// Bearer token sent with every request of one fetcher.
/// Loaded once when the fetcher is built; saved explicitly by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            saved_at: Utc::now(),
        }
    }

    /// `Ok(None)` when no token file exists yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let body = std::fs::read_to_string(path)
            .map_err(|e| WatchError::Config(format!("reading token {}: {e}", path.display())))?;
        let token: AuthToken = serde_json::from_str(&body)
            .map_err(|e| WatchError::Config(format!("parsing token {}: {e}", path.display())))?;
        Ok(Some(token))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(self).context("serializing token")?;
        std::fs::write(path, body).with_context(|| format!("writing token {}", path.display()))?;
        Ok(())
    }
}
