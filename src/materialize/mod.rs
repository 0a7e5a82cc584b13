//! Markdown archive of fetched content, one file per tracked page.
pub mod markdown;

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{Result, WatchError};
use crate::fetch::registry::KindRegistry;
use crate::materialize::markdown::{content_digest, front_matter, render_document, RenderContext};
use crate::watch::resource::TrackedResource;
use crate::watch::types::{ContentRecord, Materialized, Materializer};

/// Longest file name (in bytes, extension included) most filesystems accept.
const MAX_FILE_NAME: usize = 255;

/// Characters dropped from a title before it becomes a file name.
fn is_forbidden(c: char) -> bool {
    matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// File stem for a document title: forbidden characters removed, whitespace
/// collapsed, never empty.
pub fn safe_file_stem(title: &str) -> String {
    let cleaned: String = title.chars().filter(|c| !is_forbidden(*c)).collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches('.').trim();
    if trimmed.is_empty() {
        return "untitled".to_string();
    }
    truncate_at_char_boundary(trimmed, MAX_FILE_NAME - ".md".len()).to_string()
}

fn short_hash(s: &str) -> String {
    Sha256::digest(s.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Writes [`ContentRecord`]s as Markdown documents under `output_dir`.
pub struct MarkdownMaterializer {
    output_dir: PathBuf,
    registry: KindRegistry,
}

impl MarkdownMaterializer {
    pub fn new(output_dir: PathBuf) -> Self {
        Self::with_registry(output_dir, KindRegistry::default())
    }

    pub fn with_registry(output_dir: PathBuf, registry: KindRegistry) -> Self {
        Self {
            output_dir,
            registry,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the document for `resource`. A file with the same title that
    /// belongs to another URL pushes this one to a hash-suffixed name.
    async fn document_path(&self, resource: &TrackedResource, record: &ContentRecord) -> PathBuf {
        let title = [record.title.as_str(), resource.tip.as_str(), resource.identity.as_str()]
            .into_iter()
            .find(|t| !t.trim().is_empty())
            .unwrap_or_default();
        let stem = safe_file_stem(title);
        let plain = self.output_dir.join(format!("{stem}.md"));
        match read_front_matter_url(&plain).await {
            Some(url) if url != resource.identity => {
                let suffix = format!("-{}", short_hash(&resource.identity));
                let stem = truncate_at_char_boundary(&stem, MAX_FILE_NAME - ".md".len() - suffix.len());
                self.output_dir.join(format!("{stem}{suffix}.md"))
            }
            _ => plain,
        }
    }
}

async fn read_front_matter_url(path: &Path) -> Option<String> {
    let text = tokio::fs::read_to_string(path).await.ok()?;
    front_matter(&text)?.remove("url")
}

#[async_trait::async_trait]
impl Materializer for MarkdownMaterializer {
    async fn write(
        &self,
        resource: &TrackedResource,
        record: &ContentRecord,
        version: u64,
    ) -> Result<Materialized> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| WatchError::output(&self.output_dir, e))?;

        let path = self.document_path(resource, record).await;
        let digest = content_digest(record);

        if let Ok(existing) = tokio::fs::read_to_string(&path).await {
            let previous = front_matter(&existing).and_then(|mut fm| fm.remove("digest"));
            if previous.as_deref() == Some(digest.as_str()) {
                tracing::debug!(target: "materialize", path = %path.display(), "content unchanged");
                return Ok(Materialized {
                    path,
                    previous_equal: true,
                });
            }
        }

        let render = self
            .registry
            .handlers(resource.content_kind)
            .map(|h| h.render)
            .unwrap_or(render_document);
        let ctx = RenderContext {
            url: &resource.identity,
            version,
            fetch_date: Utc::now(),
            digest: &digest,
        };
        let document = render(record, &ctx);

        let tmp = path.with_extension("md.tmp");
        tokio::fs::write(&tmp, document.as_bytes())
            .await
            .map_err(|e| WatchError::output(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| WatchError::output(&path, e))?;
        tracing::info!(target: "materialize", path = %path.display(), version, "document written");

        Ok(Materialized {
            path,
            previous_equal: false,
        })
    }
}
