//! Layered per-resource options.
//!
//! Options come from three layers: the watcher-wide defaults, a layer for the
//! resource kind, and the override stored on the resource itself. Layers are
//! combined with [`merge_options`], later layers winning key by key.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::WatchError;
use crate::watch::types::ResourceKind;

static RE_HUMAN_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?(\d+) ?(second|seconds|minute|minutes|hour|hours|day|days)$")
        .expect("static duration regex")
});

/// A duration written the way people write them in config: `12hours`, `30 days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn days(n: i64) -> Self {
        Self(Duration::days(n))
    }

    pub fn hours(n: i64) -> Self {
        Self(Duration::hours(n))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for HumanDuration {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expr = s.trim();
        let caps = RE_HUMAN_DURATION
            .captures(expr)
            .ok_or_else(|| WatchError::Config(format!("cannot parse duration `{expr}`")))?;
        let n: i64 = caps[1]
            .parse()
            .map_err(|_| WatchError::Config(format!("duration out of range `{expr}`")))?;
        let d = match caps[2].trim_end_matches('s') {
            "second" => Duration::try_seconds(n),
            "minute" => Duration::try_minutes(n),
            "hour" => Duration::try_hours(n),
            _ => Duration::try_days(n),
        };
        d.map(Self)
            .ok_or_else(|| WatchError::Config(format!("duration out of range `{expr}`")))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.num_seconds();
        let (n, unit) = if secs != 0 && secs % 86_400 == 0 {
            (secs / 86_400, "days")
        } else if secs != 0 && secs % 3_600 == 0 {
            (secs / 3_600, "hours")
        } else if secs != 0 && secs % 60 == 0 {
            (secs / 60, "minutes")
        } else {
            (secs, "seconds")
        };
        write!(f, "{n}{unit}")
    }
}

impl Serialize for HumanDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One option layer. Every key is optional; absent keys fall through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cycle: Option<HumanDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycle: Option<HumanDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Max candidates taken from one listing check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Regex a link must match to be listed by a link index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_pattern: Option<String>,
}

impl ResourceOption {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Pure last-write-wins merge: keys set in `over` replace keys in `base`.
pub fn merge_options(base: &ResourceOption, over: &ResourceOption) -> ResourceOption {
    ResourceOption {
        min_cycle: over.min_cycle.or(base.min_cycle),
        max_cycle: over.max_cycle.or(base.max_cycle),
        weight: over.weight.or(base.weight),
        limit: over.limit.or(base.limit),
        enabled: over.enabled.or(base.enabled),
        link_pattern: over
            .link_pattern
            .clone()
            .or_else(|| base.link_pattern.clone()),
    }
}

/// Fully resolved option with every key present.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOption {
    pub min_cycle: Duration,
    pub max_cycle: Duration,
    pub weight: f64,
    pub limit: Option<usize>,
    pub enabled: bool,
    pub link_pattern: Option<String>,
}

pub const DEFAULT_WEIGHT: f64 = 0.5;

/// The global and per-kind layers a watcher resolves resource options against.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionLayers {
    pub global: ResourceOption,
    pub listing: ResourceOption,
    pub content: ResourceOption,
}

impl Default for OptionLayers {
    fn default() -> Self {
        Self {
            global: ResourceOption {
                weight: Some(DEFAULT_WEIGHT),
                enabled: Some(true),
                ..Default::default()
            },
            listing: ResourceOption {
                min_cycle: Some(HumanDuration::hours(12)),
                max_cycle: Some(HumanDuration::days(30)),
                limit: Some(200),
                ..Default::default()
            },
            content: ResourceOption {
                min_cycle: Some(HumanDuration::days(45)),
                max_cycle: Some(HumanDuration::days(180)),
                ..Default::default()
            },
        }
    }
}

impl OptionLayers {
    pub fn kind_layer(&self, kind: ResourceKind) -> &ResourceOption {
        match kind {
            ResourceKind::Listing => &self.listing,
            ResourceKind::Content => &self.content,
        }
    }

    /// Merge global <- kind <- resource and fill anything still missing.
    pub fn resolve(&self, kind: ResourceKind, own: &ResourceOption) -> ResolvedOption {
        let merged = merge_options(&merge_options(&self.global, self.kind_layer(kind)), own);
        let min_cycle = merged
            .min_cycle
            .map(|d| d.as_duration())
            .unwrap_or_else(Duration::zero)
            .max(Duration::zero());
        let max_cycle = merged
            .max_cycle
            .map(|d| d.as_duration())
            .unwrap_or(min_cycle)
            .max(min_cycle);
        let weight = merged
            .weight
            .filter(|w| w.is_finite() && *w >= 0.0)
            .unwrap_or(DEFAULT_WEIGHT);
        ResolvedOption {
            min_cycle,
            max_cycle,
            weight,
            limit: merged.limit,
            enabled: merged.enabled.unwrap_or(true),
            link_pattern: merged.link_pattern,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_humanised_durations() {
        assert_eq!("12hours".parse::<HumanDuration>().unwrap(), HumanDuration::hours(12));
        assert_eq!("1 day".parse::<HumanDuration>().unwrap(), HumanDuration::days(1));
        assert_eq!(
            "20minutes".parse::<HumanDuration>().unwrap().as_duration(),
            Duration::minutes(20)
        );
        assert!("3 weeks".parse::<HumanDuration>().is_err());
        assert!("-3days".parse::<HumanDuration>().is_err());
    }

    #[test]
    fn display_picks_largest_exact_unit() {
        assert_eq!(HumanDuration::days(30).to_string(), "30days");
        assert_eq!(HumanDuration::hours(36).to_string(), "36hours");
        assert_eq!(HumanDuration(Duration::seconds(90)).to_string(), "90seconds");
    }

    #[test]
    fn merge_is_last_write_wins_per_key() {
        let base = ResourceOption {
            weight: Some(0.5),
            min_cycle: Some(HumanDuration::days(1)),
            ..Default::default()
        };
        let over = ResourceOption {
            weight: Some(0.9),
            limit: Some(10),
            ..Default::default()
        };
        let merged = merge_options(&base, &over);
        assert_eq!(merged.weight, Some(0.9));
        assert_eq!(merged.min_cycle, Some(HumanDuration::days(1)));
        assert_eq!(merged.limit, Some(10));
        // inputs untouched
        assert_eq!(base.weight, Some(0.5));
    }

    #[test]
    fn resolve_applies_kind_layer_then_resource() {
        let layers = OptionLayers::default();
        let own = ResourceOption {
            min_cycle: Some(HumanDuration::hours(6)),
            ..Default::default()
        };
        let listing = layers.resolve(ResourceKind::Listing, &own);
        assert_eq!(listing.min_cycle, Duration::hours(6));
        assert_eq!(listing.max_cycle, Duration::days(30));
        assert_eq!(listing.limit, Some(200));
        assert!(listing.enabled);

        let content = layers.resolve(ResourceKind::Content, &ResourceOption::default());
        assert_eq!(content.min_cycle, Duration::days(45));
        assert_eq!(content.limit, None);
        assert_eq!(content.weight, DEFAULT_WEIGHT);
    }

    #[test]
    fn serialised_option_skips_absent_keys() {
        let opt = ResourceOption {
            max_cycle: Some(HumanDuration::days(7)),
            ..Default::default()
        };
        let json = serde_json::to_string(&opt).unwrap();
        assert_eq!(json, r#"{"max_cycle":"7days"}"#);
        let back: ResourceOption = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opt);
    }
}
