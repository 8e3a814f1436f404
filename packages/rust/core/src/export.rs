//! Article export: one markdown file per knowledge article plus a run
//! manifest for traceability.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};
use uuid::Uuid;

use distiller_shared::{DistillerError, KnowledgeArticle, Result};

/// The `manifest.json` written alongside exported articles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Unique run identifier (UUID v7, time-sortable).
    pub run_id: String,
    /// Tool version that produced the export.
    pub tool_version: String,
    /// When the export was written.
    pub exported_at: chrono::DateTime<Utc>,
    /// One entry per exported article, in article order.
    pub articles: Vec<ManifestEntry>,
}

/// Per-article manifest entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub category_name: String,
    /// File name within the export directory.
    pub file: String,
    /// SHA-256 of the markdown content.
    pub content_hash: String,
}

/// Output from a successful export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// Directory the articles were written to.
    pub dir: PathBuf,
    /// Paths of the written article files, in article order.
    pub files: Vec<PathBuf>,
    /// Path of the manifest file.
    pub manifest_path: PathBuf,
}

/// Turn a category name into a filesystem-safe file stem: whitespace runs
/// become a single underscore, reserved characters are dropped into the
/// same underscore runs.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        let mapped = if ch.is_whitespace() || matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
            '_'
        } else {
            ch
        };
        if mapped == '_' && slug.ends_with('_') {
            continue;
        }
        slug.push(mapped);
    }
    let trimmed = slug.trim_matches('_');
    if trimmed.is_empty() {
        "article".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Write every article to `<dir>/<slug>.md` and a `manifest.json` next to
/// them. Name collisions between slugs get a numeric suffix.
#[instrument(skip_all, fields(dir = %dir.display(), articles = articles.len()))]
pub fn export_articles(
    dir: &Path,
    articles: &[KnowledgeArticle],
    tool_version: &str,
) -> Result<ExportResult> {
    std::fs::create_dir_all(dir).map_err(|e| DistillerError::io(dir, e))?;

    let mut used: Vec<String> = Vec::new();
    let mut files = Vec::with_capacity(articles.len());
    let mut entries = Vec::with_capacity(articles.len());

    for article in articles {
        let base = slugify(&article.category_name);
        let mut stem = base.clone();
        let mut n = 1;
        while used.contains(&stem) {
            n += 1;
            stem = format!("{base}_{n}");
        }
        used.push(stem.clone());

        let file_name = format!("{stem}.md");
        let path = dir.join(&file_name);
        std::fs::write(&path, &article.markdown_content)
            .map_err(|e| DistillerError::io(&path, e))?;

        entries.push(ManifestEntry {
            category_name: article.category_name.clone(),
            file: file_name,
            content_hash: content_hash(&article.markdown_content),
        });
        files.push(path);
    }

    let manifest = ExportManifest {
        run_id: Uuid::now_v7().to_string(),
        tool_version: tool_version.to_string(),
        exported_at: Utc::now(),
        articles: entries,
    };

    let manifest_path = dir.join("manifest.json");
    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| DistillerError::validation(format!("manifest serialization: {e}")))?;
    std::fs::write(&manifest_path, json).map_err(|e| DistillerError::io(&manifest_path, e))?;

    info!(
        files = files.len(),
        manifest = %manifest_path.display(),
        "articles exported"
    );

    Ok(ExportResult {
        dir: dir.to_path_buf(),
        files,
        manifest_path,
    })
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
