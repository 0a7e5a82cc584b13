// src/fetch/feed.rs
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use url::Url;

use crate::error::{Result, WatchError};
use crate::fetch::normalize_text;
use crate::watch::option::ResolvedOption;
use crate::watch::types::Candidate;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let odt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Candidates from an RSS document, newest first. Items without a date
/// keep their feed order after the dated ones.
pub fn list_feed(body: &str, url: &str, _option: &ResolvedOption) -> Result<Vec<Candidate>> {
    let xml_clean = scrub_html_entities_for_xml(body);
    let rss: Rss = from_str(&xml_clean).map_err(|e| WatchError::parse(url, format!("rss: {e}")))?;
    let base = Url::parse(url).ok();

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let Some(link) = it
            .link
            .or(it.guid)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
        else {
            continue;
        };
        let absolute = match &base {
            Some(b) => b.join(&link).map(|u| u.to_string()).unwrap_or(link),
            None => link,
        };
        out.push(Candidate {
            url: absolute,
            tip: normalize_text(it.title.as_deref().unwrap_or_default()),
            kind: None,
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
        });
    }
    out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    Ok(out)
}
