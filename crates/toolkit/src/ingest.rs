//! File ingestion: merge inline content and on-disk directory trees.
//!
//! Two sources feed one upload: an inline map of relative path to text, and
//! a directory scan filtered by a glob. Inline entries claim their paths
//! first, so inline content strictly overrides a disk file sharing the same
//! relative path; unshadowed disk files are additive. Planning never reads
//! content; bytes are loaded one file at a time during upload, so the size
//! of a directory tree does not bound memory.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use cellbox_core::{path, Error, Result};
use cellbox_sandbox::{FileEntry, EXCLUDED_SCAN_DIRS};

/// Directory-upload specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirUpload {
    /// Host directory to scan.
    pub source: PathBuf,
    /// Glob over destination-relative paths; `None` matches everything.
    pub include: Option<String>,
}

/// Ingestion inputs: inline file map and optional directory spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSources {
    /// Inline files: destination-relative path to text content.
    pub files: BTreeMap<String, String>,
    /// Directory upload, if any.
    pub upload: Option<DirUpload>,
}

impl IngestSources {
    /// Whether there is anything to upload.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.upload.is_none()
    }
}

/// Where a planned file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileOrigin {
    /// Inline text, UTF-8 encoded at load time.
    Inline(String),
    /// A host file, read at load time.
    Disk(PathBuf),
}

/// One file selected for upload; content not yet read.
#[derive(Debug, Clone)]
pub struct PlannedFile {
    /// Destination-relative path.
    pub path: String,
    /// Content source.
    pub origin: FileOrigin,
}

/// Merge both sources into a deduplicated, precedence-ordered upload plan.
pub fn plan(sources: &IngestSources) -> Result<Vec<PlannedFile>> {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut planned = Vec::new();

    for (rel, text) in &sources.files {
        let rel = path::normalize(rel.trim_start_matches('/'));
        if claimed.insert(rel.clone()) {
            planned.push(PlannedFile {
                path: rel,
                origin: FileOrigin::Inline(text.clone()),
            });
        }
    }

    if let Some(upload) = &sources.upload {
        let include = upload
            .include
            .as_deref()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| {
                    Error::configuration(format!("invalid include pattern `{pattern}`: {e}"))
                })
            })
            .transpose()?;

        let walker = WalkDir::new(&upload.source)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .map(|name| EXCLUDED_SCAN_DIRS.contains(&name))
                        .unwrap_or(false))
            });

        for entry in walker {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = relative_path(entry.path(), &upload.source)?;
            if let Some(pattern) = &include {
                if !pattern.matches(&rel) {
                    continue;
                }
            }
            if claimed.insert(rel.clone()) {
                planned.push(PlannedFile {
                    path: rel,
                    origin: FileOrigin::Disk(entry.into_path()),
                });
            }
        }
    }

    Ok(planned)
}

/// The final upload path set: exactly the paths [`plan`] would produce,
/// same precedence, no content read. Used when only the list of available
/// filenames is needed.
pub fn paths(sources: &IngestSources) -> Result<Vec<String>> {
    Ok(plan(sources)?.into_iter().map(|file| file.path).collect())
}

/// Read one planned file into an upload entry, its path joined against
/// `destination`.
pub async fn load(destination: &str, planned: &PlannedFile) -> Result<FileEntry> {
    let target = path::resolve(destination, &planned.path);
    match &planned.origin {
        FileOrigin::Inline(text) => Ok(FileEntry::text(target, text)),
        FileOrigin::Disk(source) => {
            let content = tokio::fs::read(source).await?;
            Ok(FileEntry::new(target, content))
        }
    }
}

fn relative_path(file: &Path, root: &Path) -> Result<String> {
    let rel = file.strip_prefix(root).map_err(|e| {
        Error::configuration(format!(
            "scanned file `{}` escapes source `{}`: {e}",
            file.display(),
            root.display()
        ))
    })?;
    let segments: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(segments.join("/"))
}
