// src/fetch/link_index.rs
use std::collections::HashSet;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{Result, WatchError};
use crate::fetch::normalize_text;
use crate::watch::option::ResolvedOption;
use crate::watch::types::Candidate;

fn bare_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

/// Same-host links of an HTML index page in document order, optionally
/// restricted to those matching `link_pattern`.
pub fn list_links(body: &str, url: &str, option: &ResolvedOption) -> Result<Vec<Candidate>> {
    let base = Url::parse(url).map_err(|e| WatchError::parse(url, e))?;
    let host = bare_host(&base);
    let pattern = option
        .link_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| WatchError::parse(url, format!("link_pattern: {e}")))?;
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Ok(Vec::new());
    };

    let document = Html::parse_document(body);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for a in document.select(&anchors) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Ok(mut link) = base.join(href.trim()) else {
            continue;
        };
        if !matches!(link.scheme(), "http" | "https") || bare_host(&link) != host {
            continue;
        }
        link.set_fragment(None);
        if link == base {
            continue;
        }
        let link = link.to_string();
        if let Some(re) = &pattern {
            if !re.is_match(&link) {
                continue;
            }
        }
        if !seen.insert(link.clone()) {
            continue;
        }
        let text: String = a.text().collect::<Vec<_>>().join(" ");
        out.push(Candidate::new(link, normalize_text(&text)));
    }
    Ok(out)
}
