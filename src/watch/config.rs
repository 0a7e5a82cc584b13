// src/watch/config.rs
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchError};
use crate::watch::option::{HumanDuration, OptionLayers, ResourceOption, DEFAULT_WEIGHT};
use crate::watch::reconcile::canonical_url;

pub const ENV_CONFIG_PATH: &str = "PAGE_WATCHER_CONFIG";
pub const CONFIG_TOML: &str = ".config.toml";
pub const CONFIG_JSON: &str = ".config.json";

fn default_min_listing_cycle() -> HumanDuration {
    HumanDuration::hours(12)
}
fn default_max_listing_cycle() -> HumanDuration {
    HumanDuration::days(30)
}
fn default_min_content_cycle() -> HumanDuration {
    HumanDuration::days(45)
}
fn default_max_content_cycle() -> HumanDuration {
    HumanDuration::days(180)
}
fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}
fn default_batch_size() -> usize {
    3
}
fn default_output_path() -> PathBuf {
    PathBuf::from(".")
}
fn default_listing_limit() -> usize {
    200
}
fn default_pause_secs() -> (u64, u64) {
    (5, 10)
}
fn default_timeout_seconds() -> u64 {
    20
}

/// Watcher-wide defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalOptions {
    #[serde(default = "default_min_listing_cycle")]
    pub min_listing_cycle: HumanDuration,
    #[serde(default = "default_max_listing_cycle")]
    pub max_listing_cycle: HumanDuration,
    #[serde(default = "default_min_content_cycle")]
    pub min_content_cycle: HumanDuration,
    #[serde(default = "default_max_content_cycle")]
    pub max_content_cycle: HumanDuration,
    #[serde(default = "default_weight")]
    pub default_weight: f64,
    /// Content resources persisted and committed together.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Where Markdown files land, relative to the watcher directory.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    #[serde(default = "default_listing_limit")]
    pub listing_limit: usize,
    /// Jittered pause range between resources and batches.
    #[serde(default = "default_pause_secs")]
    pub pause_secs: (u64, u64),
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            min_listing_cycle: default_min_listing_cycle(),
            max_listing_cycle: default_max_listing_cycle(),
            min_content_cycle: default_min_content_cycle(),
            max_content_cycle: default_max_content_cycle(),
            default_weight: default_weight(),
            batch_size: default_batch_size(),
            output_path: default_output_path(),
            listing_limit: default_listing_limit(),
            pause_secs: default_pause_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionControlOptions {
    /// Repository to commit into, relative to the watcher directory.
    pub git_commit_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOptions {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Bearer token file, relative to the watcher directory.
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            user_agent: None,
            token_path: None,
        }
    }
}

/// An explicitly configured listing resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListerConfig {
    pub url: String,
    #[serde(default)]
    pub tip: String,
    #[serde(default)]
    pub option: ResourceOption,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default)]
    pub options: GlobalOptions,
    #[serde(default)]
    pub version_control: Option<VersionControlOptions>,
    #[serde(default)]
    pub fetch: FetchOptions,
    #[serde(default)]
    pub listers: Vec<ListerConfig>,
}

impl WatcherConfig {
    /// Global and per-kind option layers derived from `options`.
    pub fn layers(&self) -> OptionLayers {
        let o = &self.options;
        OptionLayers {
            global: ResourceOption {
                weight: Some(o.default_weight),
                enabled: Some(true),
                ..Default::default()
            },
            listing: ResourceOption {
                min_cycle: Some(o.min_listing_cycle),
                max_cycle: Some(o.max_listing_cycle),
                limit: Some(o.listing_limit),
                ..Default::default()
            },
            content: ResourceOption {
                min_cycle: Some(o.min_content_cycle),
                max_cycle: Some(o.max_content_cycle),
                ..Default::default()
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        let o = &self.options;
        if o.min_listing_cycle > o.max_listing_cycle {
            return Err(WatchError::Config(
                "min_listing_cycle must be <= max_listing_cycle".into(),
            ));
        }
        if o.min_content_cycle > o.max_content_cycle {
            return Err(WatchError::Config(
                "min_content_cycle must be <= max_content_cycle".into(),
            ));
        }
        if o.batch_size == 0 {
            return Err(WatchError::Config("batch_size must be >= 1".into()));
        }
        if !o.default_weight.is_finite() || o.default_weight < 0.0 {
            return Err(WatchError::Config(
                "default_weight must be a non-negative number".into(),
            ));
        }
        if o.pause_secs.0 > o.pause_secs.1 {
            return Err(WatchError::Config("pause_secs min must be <= max".into()));
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(WatchError::Config("timeout_seconds must be >= 1".into()));
        }
        for lister in &self.listers {
            canonical_url(&lister.url)
                .map_err(|e| WatchError::Config(format!("lister url `{}`: {e}", lister.url)))?;
            validate_option(&lister.option)
                .map_err(|e| WatchError::Config(format!("lister `{}`: {e}", lister.url)))?;
        }
        Ok(())
    }
}

fn validate_option(option: &ResourceOption) -> std::result::Result<(), String> {
    if let (Some(min), Some(max)) = (option.min_cycle, option.max_cycle) {
        if min > max {
            return Err("min_cycle must be <= max_cycle".into());
        }
    }
    if let Some(w) = option.weight {
        if !w.is_finite() || w < 0.0 {
            return Err("weight must be a non-negative number".into());
        }
    }
    if let Some(p) = &option.link_pattern {
        Regex::new(p).map_err(|e| format!("link_pattern: {e}"))?;
    }
    Ok(())
}

/// Load a configuration document from an explicit path. Supports TOML or JSON.
pub fn load_config_from(path: &Path) -> Result<WatcherConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| WatchError::Config(format!("reading {}: {e}", path.display())))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = parse_config(&content, ext.as_str())
        .map_err(|e| WatchError::Config(format!("{}: {e}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Locate the configuration for a watcher directory:
/// 1) $PAGE_WATCHER_CONFIG
/// 2) `<dir>/.config.toml`
/// 3) `<dir>/.config.json`
pub fn config_path_for(dir: &Path) -> Result<PathBuf> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(pb);
        }
        return Err(WatchError::Config(format!(
            "{ENV_CONFIG_PATH} points to non-existent path {}",
            pb.display()
        )));
    }
    for name in [CONFIG_TOML, CONFIG_JSON] {
        let p = dir.join(name);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(WatchError::Config(format!(
        "no {CONFIG_TOML} or {CONFIG_JSON} in {}",
        dir.display()
    )))
}

pub fn load_config_for(dir: &Path) -> Result<WatcherConfig> {
    load_config_from(&config_path_for(dir)?)
}

fn parse_config(s: &str, hint_ext: &str) -> std::result::Result<WatcherConfig, String> {
    if hint_ext == "json" {
        return serde_json::from_str(s).map_err(|e| e.to_string());
    }
    match toml::from_str(s) {
        Ok(cfg) => Ok(cfg),
        // No explicit hint: a JSON document is still accepted.
        Err(toml_err) if hint_ext != "toml" => {
            serde_json::from_str(s).map_err(|_| toml_err.to_string())
        }
        Err(toml_err) => Err(toml_err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const SAMPLE: &str = r#"
[options]
min_listing_cycle = "6hours"
batch_size = 2
pause_secs = [0, 0]

[version_control]
git_commit_path = "."

[[listers]]
url = "https://example.com/feed.xml"
tip = "example"
[listers.option]
weight = 0.9
"#;

    #[test]
    fn toml_fills_defaults() {
        let cfg = parse_config(SAMPLE, "toml").unwrap();
        assert_eq!(cfg.options.min_listing_cycle, HumanDuration::hours(6));
        assert_eq!(cfg.options.max_listing_cycle, HumanDuration::days(30));
        assert_eq!(cfg.options.batch_size, 2);
        assert_eq!(cfg.options.listing_limit, 200);
        assert_eq!(cfg.listers.len(), 1);
        assert_eq!(cfg.listers[0].option.weight, Some(0.9));
        assert!(cfg.version_control.is_some());
        assert_eq!(cfg.fetch.timeout_seconds, 20);
        cfg.validate().unwrap();
    }

    #[test]
    fn json_is_accepted() {
        let cfg = parse_config(
            r#"{"options": {"batch_size": 5}, "listers": [{"url": "https://e.com/i"}]}"#,
            "json",
        )
        .unwrap();
        assert_eq!(cfg.options.batch_size, 5);
        assert_eq!(cfg.listers[0].tip, "");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = WatcherConfig::default();
        cfg.options.batch_size = 0;
        assert!(cfg.validate().unwrap_err().to_string().contains("batch_size"));

        let mut cfg = WatcherConfig::default();
        cfg.options.min_content_cycle = HumanDuration::days(200);
        assert!(cfg.validate().is_err());

        let mut cfg = WatcherConfig::default();
        cfg.listers.push(ListerConfig {
            url: "https://e.com/i".into(),
            tip: String::new(),
            option: ResourceOption {
                link_pattern: Some("(".into()),
                ..Default::default()
            },
        });
        assert!(cfg.validate().unwrap_err().to_string().contains("link_pattern"));
    }

    #[test]
    fn bad_duration_is_a_config_error() {
        let err = parse_config("[options]\nmin_listing_cycle = \"soon\"\n", "toml").unwrap_err();
        assert!(err.contains("soon"));
    }

    #[serial_test::serial]
    #[test]
    fn env_path_takes_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        env::remove_var(ENV_CONFIG_PATH);
        assert!(config_path_for(tmp.path()).is_err());

        fs::write(tmp.path().join(CONFIG_JSON), "{}").unwrap();
        assert_eq!(config_path_for(tmp.path()).unwrap(), tmp.path().join(CONFIG_JSON));

        fs::write(tmp.path().join(CONFIG_TOML), "").unwrap();
        assert_eq!(config_path_for(tmp.path()).unwrap(), tmp.path().join(CONFIG_TOML));

        let other = tmp.path().join("elsewhere.toml");
        fs::write(&other, SAMPLE).unwrap();
        env::set_var(ENV_CONFIG_PATH, other.display().to_string());
        assert_eq!(config_path_for(tmp.path()).unwrap(), other);
        let cfg = load_config_for(tmp.path()).unwrap();
        assert_eq!(cfg.options.batch_size, 2);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(config_path_for(tmp.path()).is_err());
        env::remove_var(ENV_CONFIG_PATH);
    }
}
