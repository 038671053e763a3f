use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid path")]
    Traversal,
    #[error("File not found")]
    NotFound,
    #[error("Path is a directory")]
    Directory,
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Join `rel` onto `base` lexically, refusing anything that would end up
/// outside `base`. The result is not checked for existence.
pub fn resolve_within(base: &Path, rel: &str) -> Result<PathBuf, PathError> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(PathError::Traversal);
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(PathError::Traversal),
        }
    }

    let mut resolved = base.to_path_buf();
    resolved.extend(parts);
    Ok(resolved)
}

/// Absolute path of a library-relative item path.
pub fn resolve_library_path(root: &Path, rel: &str) -> Result<PathBuf, PathError> {
    resolve_within(root, rel)
}

/// File served for `GET /api/items/{id}/html/{asset}`. An empty asset is the
/// document itself; anything else is looked up next to the document and may
/// not leave its folder.
pub fn resolve_html_asset(root: &Path, item_path: &str, asset: &str) -> Result<PathBuf, PathError> {
    let document = resolve_library_path(root, item_path)?;
    if !document.is_file() {
        return Err(PathError::NotFound);
    }
    let asset = asset.trim_start_matches('/');

    let target = if asset.is_empty() {
        document
    } else {
        let dir = document.parent().ok_or(PathError::Traversal)?;
        resolve_within(dir, asset)?
    };

    match std::fs::metadata(&target) {
        Ok(meta) if meta.is_dir() => Err(PathError::Directory),
        Ok(_) => Ok(target),
        Err(_) => Err(PathError::NotFound),
    }
}

// ---------------------------------------------------------------------------
// Byte ranges
// ---------------------------------------------------------------------------

/// Inclusive byte range of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn byte_count(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Interpret a `Range` header against a file of `size` bytes.
///
/// Returns `None` when there is no header or the file is empty. A header
/// that cannot be satisfied selects the whole file rather than failing, and
/// an end past the file is clamped. Only the first range of a multi-range
/// request is honored.
pub fn parse_range(header: Option<&str>, size: u64) -> Option<ByteRange> {
    let header = header?;
    if size == 0 {
        return None;
    }
    let whole = ByteRange {
        start: 0,
        end: size - 1,
    };

    let spec = header.trim().strip_prefix("bytes=").unwrap_or(header.trim());
    let spec = spec.split(',').next().unwrap_or("").trim();
    let Some((start, end)) = spec.split_once('-') else {
        return Some(whole);
    };
    let (start, end) = (start.trim(), end.trim());

    // Suffix form: the last N bytes.
    if start.is_empty() {
        return match end.parse::<u64>() {
            Ok(n) if n > 0 => Some(ByteRange {
                start: size.saturating_sub(n),
                end: size - 1,
            }),
            _ => Some(whole),
        };
    }

    let Ok(start) = start.parse::<u64>() else {
        return Some(whole);
    };
    let end = if end.is_empty() {
        size - 1
    } else {
        match end.parse::<u64>() {
            Ok(e) => e.min(size - 1),
            Err(_) => return Some(whole),
        }
    };

    if start > end {
        return Some(whole);
    }
    Some(ByteRange { start, end })
}

/// Content type for a served file, by extension.
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
