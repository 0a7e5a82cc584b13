// src/fetch/mod.rs
pub mod article;
pub mod feed;
pub mod link_index;
pub mod registry;
pub mod token;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::error::{Result, WatchError};
use crate::fetch::registry::KindRegistry;
use crate::fetch::token::AuthToken;
use crate::watch::config::FetchOptions;
use crate::watch::option::ResolvedOption;
use crate::watch::resource::TrackedResource;
use crate::watch::types::{Candidate, ContentRecord, Fetcher};

const DEFAULT_USER_AGENT: &str = concat!("page-watcher/", env!("CARGO_PKG_VERSION"));

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("static tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static ws regex"));

/// Normalize a short label: decode entities, strip tags, fold fancy quotes,
/// collapse whitespace and cap the length.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();
    let stripped = RE_TAGS.replace_all(&decoded, "");
    let folded = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let out = RE_WS.replace_all(&folded, " ").trim().to_string();
    if out.chars().count() > 200 {
        out.chars().take(200).collect()
    } else {
        out
    }
}

/// Build the one HTTP client a fetcher uses for its lifetime.
pub fn build_client(options: &FetchOptions, token: Option<&AuthToken>) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if let Some(t) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", t.token.trim()))
            .map_err(|e| WatchError::Config(format!("auth token is not a valid header: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    let ua = options
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    reqwest::Client::builder()
        .timeout(Duration::from_secs(options.timeout_seconds))
        .user_agent(ua)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| WatchError::Config(format!("failed to build HTTP client: {e}")))
}

/// Fetches remote pages over HTTP and hands the bodies to the parser
/// registered for each resource's content kind.
pub struct HttpFetcher {
    client: reqwest::Client,
    registry: KindRegistry,
}

impl HttpFetcher {
    /// Build from the `[fetch]` section; `token_path` is relative to `watcher_dir`.
    pub fn new(options: &FetchOptions, watcher_dir: &Path) -> Result<Self> {
        let token = match &options.token_path {
            Some(p) => AuthToken::load(&watcher_dir.join(p))?,
            None => None,
        };
        let client = build_client(options, token.as_ref())?;
        Ok(Self::with_client(client, KindRegistry::default()))
    }

    pub fn with_client(client: reqwest::Client, registry: KindRegistry) -> Self {
        Self { client, registry }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WatchError::fetch(url, format!("http get: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(WatchError::fetch(url, format!("status {status}")));
        }
        resp.text()
            .await
            .map_err(|e| WatchError::fetch(url, format!("reading body: {e}")))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_listing(
        &self,
        resource: &TrackedResource,
        option: &ResolvedOption,
    ) -> Result<Vec<Candidate>> {
        let list = self
            .registry
            .handlers(resource.content_kind)
            .and_then(|h| h.list)
            .ok_or_else(|| {
                WatchError::parse(
                    &resource.identity,
                    format!("{:?} has no listing parser", resource.content_kind),
                )
            })?;
        let body = self.get_text(&resource.identity).await?;
        list(&body, &resource.identity, option)
    }

    async fn fetch_content(&self, resource: &TrackedResource) -> Result<ContentRecord> {
        let parse = self
            .registry
            .handlers(resource.content_kind)
            .and_then(|h| h.parse)
            .ok_or_else(|| {
                WatchError::parse(
                    &resource.identity,
                    format!("{:?} has no content parser", resource.content_kind),
                )
            })?;
        let body = self.get_text(&resource.identity).await?;
        parse(&body, &resource.identity)
    }
}
