// src/fetch/registry.rs
use std::collections::HashMap;

use crate::error::Result;
use crate::fetch::{article, feed, link_index};
use crate::materialize::markdown::{render_document, RenderContext};
use crate::watch::option::ResolvedOption;
use crate::watch::types::{Candidate, ContentKind, ContentRecord};

/// Listing parser: `(body, url, option) -> candidates`, newest first.
pub type ListFn = fn(&str, &str, &ResolvedOption) -> Result<Vec<Candidate>>;
/// Content parser: `(body, url) -> record` with a Markdown body.
pub type ParseFn = fn(&str, &str) -> Result<ContentRecord>;
/// Renders a record into the stored document text.
pub type RenderFn = fn(&ContentRecord, &RenderContext<'_>) -> String;

#[derive(Clone, Copy)]
pub struct KindHandlers {
    pub list: Option<ListFn>,
    pub parse: Option<ParseFn>,
    pub render: RenderFn,
}

/// Capability table keyed by [`ContentKind`].
#[derive(Clone)]
pub struct KindRegistry {
    table: HashMap<ContentKind, KindHandlers>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(
            ContentKind::Feed,
            KindHandlers {
                list: Some(feed::list_feed),
                parse: None,
                render: render_document,
            },
        );
        registry.register(
            ContentKind::LinkIndex,
            KindHandlers {
                list: Some(link_index::list_links),
                parse: None,
                render: render_document,
            },
        );
        registry.register(
            ContentKind::Article,
            KindHandlers {
                list: None,
                parse: Some(article::parse_article),
                render: render_document,
            },
        );
        registry
    }
}

impl KindRegistry {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Add or replace the handlers for `kind`.
    pub fn register(&mut self, kind: ContentKind, handlers: KindHandlers) {
        self.table.insert(kind, handlers);
    }

    pub fn handlers(&self, kind: ContentKind) -> Option<&KindHandlers> {
        self.table.get(&kind)
    }
}
