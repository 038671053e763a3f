use std::fs::Metadata;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use walkdir::{DirEntry, WalkDir};

use crate::extract::{ExtractorRegistry, ItemType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub item_type: ItemType,
}

#[derive(Debug, Default)]
pub struct WalkResult {
    pub candidates: Vec<Candidate>,
    pub errors: Vec<String>,
    /// Entries the walk could not read. Anything at or below these paths may
    /// still exist on disk.
    pub unreadable: Vec<PathBuf>,
}

/// Recursively collect supported documents under `root`. Hidden entries
/// (leading `.`) are skipped and hidden directories are not descended.
/// Candidates come back sorted by path.
pub fn walk_library(root: &Path, registry: &ExtractorRegistry) -> WalkResult {
    let mut result = WalkResult::default();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                result.errors.push(format!("walk error: {err}"));
                let path = err.path().unwrap_or(root);
                result.unreadable.push(path.to_path_buf());
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if let Some(item_type) = registry.detect_type(entry.path()) {
            result.candidates.push(Candidate {
                path: entry.into_path(),
                item_type,
            });
        }
    }

    result.candidates.sort_by(|a, b| a.path.cmp(&b.path));
    result
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// True if any component of `path` below `root` starts with a dot.
pub fn has_hidden_component(path: &Path, root: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Library-relative path with `/` separators regardless of platform.
pub fn relative_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Folder part of a relative path; empty for files at the library root.
pub fn folder_of(rel_path: &str) -> String {
    match rel_path.rsplit_once('/') {
        Some((folder, _)) => folder.to_string(),
        None => String::new(),
    }
}

/// File modification time in milliseconds since the Unix epoch.
pub fn modified_millis(meta: &Metadata) -> Result<i64> {
    let modified = meta.modified().context("file system does not report mtime")?;
    Ok(DateTime::<Utc>::from(modified).timestamp_millis())
}
