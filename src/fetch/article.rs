//! Generic article extraction: title, a few metadata fields, and the main
//! content area converted to Markdown.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};

use crate::error::{Result, WatchError};
use crate::fetch::normalize_text;
use crate::materialize::markdown::html_to_markdown;
use crate::watch::types::ContentRecord;

const CONTENT_SELECTORS: [&str; 5] = [
    "article",
    "main",
    "[role=\"main\"]",
    "#content",
    "body",
];

/// `(metadata key, selector, attribute)` lookups, first hit wins per key.
const META_FIELDS: [(&str, &str, &str); 6] = [
    ("author", "meta[name=\"author\"]", "content"),
    ("author", "meta[property=\"article:author\"]", "content"),
    ("published", "meta[property=\"article:published_time\"]", "content"),
    ("published", "time[datetime]", "datetime"),
    ("description", "meta[name=\"description\"]", "content"),
    ("site", "meta[property=\"og:site_name\"]", "content"),
];

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(normalize_text)
        .find(|v| !v.is_empty())
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .map(|el| normalize_text(&el.text().collect::<Vec<_>>().join(" ")))
        .find(|v| !v.is_empty())
}

fn extract_title(document: &Html) -> Option<String> {
    first_attr(document, "meta[property=\"og:title\"]", "content")
        .or_else(|| first_text(document, "h1"))
        .or_else(|| first_text(document, "title"))
}

fn main_element(document: &Html) -> Option<ElementRef<'_>> {
    CONTENT_SELECTORS.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        document
            .select(&sel)
            .find(|el| !el.text().collect::<String>().trim().is_empty())
    })
}

pub fn parse_article(body: &str, url: &str) -> Result<ContentRecord> {
    let document = Html::parse_document(body);
    let title = extract_title(&document).unwrap_or_default();
    let main = main_element(&document)
        .ok_or_else(|| WatchError::parse(url, "no content area found"))?;
    let markdown = html_to_markdown(&main.inner_html());
    if markdown.trim().is_empty() {
        return Err(WatchError::parse(url, "content area is empty"));
    }

    let mut metadata = BTreeMap::new();
    for (key, selector, attr) in META_FIELDS {
        if metadata.contains_key(key) {
            continue;
        }
        if let Some(v) = first_attr(&document, selector, attr) {
            metadata.insert(key.to_string(), v);
        }
    }

    Ok(ContentRecord {
        title,
        body: markdown,
        metadata,
    })
}
