//! HTML to Markdown conversion and the stored document layout.
//!
//! Stored documents look like
//!
//! ```text
//! ---
//! title: ...
//! url: ...
//! version: 3
//! fetch_date: 2025-03-04 10:00:00
//! digest: <sha256 of title + body>
//! author: ...
//! ---
//!
//! # title
//!
//! body
//! ```
//!
//! Article headings are demoted so they start at `###`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use sha2::{Digest, Sha256};
use url::Url;

use crate::watch::types::ContentRecord;

static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static blank-run regex"));
static RE_INLINE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\n]+").expect("static ws regex"));

const SKIPPED_TAGS: [&str; 9] = [
    "script", "style", "noscript", "nav", "footer", "iframe", "svg", "form", "button",
];

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Unordered,
    Ordered(usize),
}

#[derive(Default)]
struct MarkdownWriter {
    out: String,
    lists: Vec<ListKind>,
}

impl MarkdownWriter {
    fn ends_with_space(&self) -> bool {
        self.out.is_empty() || self.out.ends_with([' ', '\n'])
    }

    fn block_break(&mut self) {
        if self.out.is_empty() {
            return;
        }
        let trimmed = self.out.trim_end_matches([' ', '\t']).len();
        self.out.truncate(trimmed);
        while !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn line_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn text(&mut self, raw: &str) {
        let collapsed = RE_INLINE_WS.replace_all(raw, " ");
        let piece: &str = if self.ends_with_space() {
            collapsed.trim_start()
        } else {
            &collapsed[..]
        };
        self.out.push_str(piece);
    }

    fn children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            if let Some(child_el) = ElementRef::wrap(child) {
                self.element(child_el);
            } else if let Some(text) = child.value().as_text() {
                self.text(text);
            }
        }
    }

    /// Render `el`'s children on their own and return the inline text.
    fn inline_of(&self, el: ElementRef<'_>) -> String {
        let mut sub = MarkdownWriter::default();
        sub.children(el);
        RE_INLINE_WS.replace_all(sub.out.trim(), " ").into_owned()
    }

    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIPPED_TAGS.contains(&name) {
            return;
        }
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                let text = self.inline_of(el);
                if text.is_empty() {
                    return;
                }
                self.block_break();
                self.out.push_str(&"#".repeat((level + 2).min(6)));
                self.out.push(' ');
                self.out.push_str(&text);
                self.block_break();
            }
            "p" | "div" | "section" | "article" | "main" | "header" | "figure" | "table" => {
                if self.lists.is_empty() {
                    self.block_break();
                } else {
                    self.line_break();
                }
                self.children(el);
                if self.lists.is_empty() {
                    self.block_break();
                }
            }
            "tr" | "figcaption" => {
                self.line_break();
                self.children(el);
                self.line_break();
            }
            "br" => self.out.push('\n'),
            "hr" => {
                self.block_break();
                self.out.push_str("---");
                self.block_break();
            }
            "strong" | "b" => self.wrap_inline(el, "**"),
            "em" | "i" => self.wrap_inline(el, "*"),
            "del" | "s" => self.wrap_inline(el, "~~"),
            "code" => {
                let code: String = el.text().collect();
                if !code.is_empty() {
                    self.out.push('`');
                    self.out.push_str(code.trim());
                    self.out.push('`');
                }
            }
            "pre" => self.code_block(el),
            "a" => self.link(el),
            "img" => self.image(el),
            "ul" | "ol" => {
                if self.lists.is_empty() {
                    self.block_break();
                }
                self.lists.push(if name == "ol" {
                    ListKind::Ordered(0)
                } else {
                    ListKind::Unordered
                });
                self.children(el);
                self.lists.pop();
                if self.lists.is_empty() {
                    self.block_break();
                } else {
                    self.line_break();
                }
            }
            "li" => self.list_item(el),
            "blockquote" => {
                let mut sub = MarkdownWriter::default();
                sub.children(el);
                let quoted = sub.out.trim().to_string();
                if quoted.is_empty() {
                    return;
                }
                self.block_break();
                let lines: Vec<String> = quoted
                    .lines()
                    .map(|l| if l.is_empty() { ">".to_string() } else { format!("> {l}") })
                    .collect();
                self.out.push_str(&lines.join("\n"));
                self.block_break();
            }
            _ => self.children(el),
        }
    }

    fn wrap_inline(&mut self, el: ElementRef<'_>, marker: &str) {
        let inner = self.inline_of(el);
        if inner.is_empty() {
            return;
        }
        if !self.ends_with_space() && self.out.ends_with(|c: char| c.is_alphanumeric()) {
            self.out.push(' ');
        }
        self.out.push_str(marker);
        self.out.push_str(&inner);
        self.out.push_str(marker);
    }

    fn link(&mut self, el: ElementRef<'_>) {
        let text = self.inline_of(el);
        let Some(href) = el.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
            self.text(&text);
            return;
        };
        if href.starts_with('#') || href.starts_with("javascript:") {
            self.text(&text);
            return;
        }
        let target = unwrap_redirect(href);
        let label = if text.is_empty() { target.clone() } else { text };
        self.out.push_str(&format!("[{label}]({target})"));
    }

    fn image(&mut self, el: ElementRef<'_>) {
        let attrs = el.value();
        let Some(src) = ["data-original", "data-src", "src"]
            .iter()
            .find_map(|a| attrs.attr(a))
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return;
        };
        let alt = attrs
            .attr("alt")
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or("image");
        let src = if src.starts_with("//") {
            format!("https:{src}")
        } else {
            src.to_string()
        };
        self.out.push_str(&format!("![{alt}]({src})"));
    }

    fn code_block(&mut self, el: ElementRef<'_>) {
        let lang = code_language(el).unwrap_or_default();
        let code: String = el.text().collect();
        self.block_break();
        self.out.push_str("```");
        self.out.push_str(&lang);
        self.out.push('\n');
        self.out.push_str(code.trim_end_matches(['\n', ' ']));
        self.out.push_str("\n```");
        self.block_break();
    }

    fn list_item(&mut self, el: ElementRef<'_>) {
        let depth = self.lists.len().max(1);
        let marker = match self.lists.last_mut() {
            Some(ListKind::Ordered(n)) => {
                *n += 1;
                format!("{n}. ")
            }
            _ => "- ".to_string(),
        };
        self.line_break();
        self.out.push_str(&"  ".repeat(depth - 1));
        self.out.push_str(&marker);
        self.children(el);
        self.line_break();
    }
}

/// Language of a `<pre>` block from `language-*` / `lang-*` classes on it or its `<code>`.
fn code_language(pre: ElementRef<'_>) -> Option<String> {
    let from = |el: ElementRef<'_>| {
        el.value().classes().find_map(|c| {
            c.strip_prefix("language-")
                .or_else(|| c.strip_prefix("lang-"))
                .map(str::to_string)
        })
    };
    from(pre).or_else(|| {
        pre.children()
            .filter_map(ElementRef::wrap)
            .find(|c| c.value().name() == "code")
            .and_then(from)
    })
}

/// Unwrap tracking redirects like `//link.example.com/?target=https%3A//real.site/x`.
pub fn unwrap_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    if let Ok(parsed) = Url::parse(&absolute) {
        if let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "target") {
            let target = target.into_owned();
            if target.starts_with("http") {
                return target;
            }
        }
    }
    absolute
}

/// Convert an HTML fragment to Markdown.
pub fn html_to_markdown(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut writer = MarkdownWriter::default();
    writer.children(fragment.root_element());
    let lines: Vec<&str> = writer.out.lines().map(str::trim_end).collect();
    let joined = lines.join("\n");
    RE_BLANK_RUNS.replace_all(joined.trim(), "\n\n").into_owned()
}

/// SHA-256 over title and body; volatile fields (dates, version) are excluded.
pub fn content_digest(record: &ContentRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.title.trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(record.body.trim().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub struct RenderContext<'a> {
    pub url: &'a str,
    pub version: u64,
    pub fetch_date: DateTime<Utc>,
    pub digest: &'a str,
}

fn single_line(s: &str) -> String {
    RE_INLINE_WS.replace_all(s.trim(), " ").into_owned()
}

/// Default document layout: front matter, `# title`, body.
pub fn render_document(record: &ContentRecord, ctx: &RenderContext<'_>) -> String {
    let mut out = String::from("---\n");
    out.push_str(&format!("title: {}\n", single_line(&record.title)));
    out.push_str(&format!("url: {}\n", ctx.url));
    out.push_str(&format!("version: {}\n", ctx.version));
    out.push_str(&format!(
        "fetch_date: {}\n",
        ctx.fetch_date.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!("digest: {}\n", ctx.digest));
    for (k, v) in &record.metadata {
        if matches!(k.as_str(), "title" | "url" | "version" | "fetch_date" | "digest") {
            continue;
        }
        out.push_str(&format!("{}: {}\n", single_line(k), single_line(v)));
    }
    out.push_str("---\n\n");
    out.push_str(&format!("# {}\n\n", single_line(&record.title)));
    out.push_str(record.body.trim());
    out.push('\n');
    out
}

/// Key/value pairs of a document's front matter, if it has one.
pub fn front_matter(document: &str) -> Option<BTreeMap<String, String>> {
    let rest = document.strip_prefix("---\n")?;
    let end = rest.find("\n---")?;
    let map = rest[..end]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect();
    Some(map)
}
