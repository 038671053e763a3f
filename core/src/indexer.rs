use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::config::Config;
use crate::db::{now_millis, Database, NewItem};
use crate::extract::{ExtractedMeta, ExtractorRegistry, ItemType};
use crate::thumbs::{ThumbSource, ThumbnailCache, Variant};
use crate::walker::{folder_of, modified_millis, relative_path, walk_library, Candidate};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScanStats {
    pub files_seen: usize,
    pub items_upserted: usize,
    pub thumbnails_rendered: usize,
    pub items_removed: usize,
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Indexer
// ---------------------------------------------------------------------------

/// Walks the library, keeps the items table in step with it and renders
/// thumbnails. The database lock is taken per file so HTTP handlers keep
/// running during a scan.
pub struct Indexer<'a> {
    db: &'a Mutex<Database>,
    registry: &'a ExtractorRegistry,
    cache: &'a ThumbnailCache,
    library_root: PathBuf,
    html_thumbnails: bool,
}

impl<'a> Indexer<'a> {
    pub fn new(
        db: &'a Mutex<Database>,
        registry: &'a ExtractorRegistry,
        cache: &'a ThumbnailCache,
        library_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            db,
            registry,
            cache,
            library_root: library_root.into(),
            html_thumbnails: false,
        }
    }

    pub fn from_config(
        db: &'a Mutex<Database>,
        registry: &'a ExtractorRegistry,
        cache: &'a ThumbnailCache,
        config: &Config,
    ) -> Self {
        Self::new(db, registry, cache, config.library_root.clone())
            .with_html_thumbnails(config.enable_html_thumbnails)
    }

    /// Render HTML cards during the scan instead of on first request.
    pub fn with_html_thumbnails(mut self, enabled: bool) -> Self {
        self.html_thumbnails = enabled;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'a, Database>> {
        self.db.lock().map_err(|e| anyhow!("lock error: {e}"))
    }

    /// Full scan: upsert every supported file, render missing or stale
    /// thumbnails, then drop items whose file is gone.
    pub fn scan_library(&self) -> Result<ScanStats> {
        std::fs::create_dir_all(&self.library_root).with_context(|| {
            format!("failed to create library root {}", self.library_root.display())
        })?;

        let walk = walk_library(&self.library_root, self.registry);
        let unreadable: Vec<String> = walk
            .unreadable
            .iter()
            .map(|p| relative_path(p, &self.library_root))
            .collect();
        let mut stats = ScanStats {
            errors: walk.errors,
            ..Default::default()
        };
        let mut seen = HashSet::with_capacity(walk.candidates.len());

        for candidate in &walk.candidates {
            stats.files_seen += 1;
            let rel_path = relative_path(&candidate.path, &self.library_root);
            seen.insert(rel_path.clone());

            let metadata = match std::fs::metadata(&candidate.path) {
                Ok(m) => m,
                Err(err) => {
                    stats.errors.push(format!("{rel_path}: metadata error: {err}"));
                    continue;
                }
            };
            let mtime = match modified_millis(&metadata) {
                Ok(m) => m,
                Err(err) => {
                    stats.errors.push(format!("{rel_path}: {err}"));
                    continue;
                }
            };

            let item = self.describe(candidate, &rel_path, metadata.len() as i64, mtime);
            let item_id = self.lock()?.upsert_item(&item, now_millis())?;
            stats.items_upserted += 1;

            if candidate.item_type == ItemType::Html && !self.html_thumbnails {
                continue;
            }
            let source = ThumbSource {
                item_id,
                item_type: candidate.item_type,
                path: candidate.path.clone(),
                mtime,
            };
            for variant in Variant::ALL {
                match self.cache.ensure(&source, variant) {
                    Ok(outcome) => {
                        let db = self.lock()?;
                        if outcome.rendered || db.get_thumbnail(item_id, variant)?.is_none() {
                            db.upsert_thumbnail(&outcome.record(item_id, variant))?;
                        }
                        if outcome.rendered {
                            stats.thumbnails_rendered += 1;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(path = %rel_path, variant = %variant, error = %err, "thumbnail failed");
                        stats.errors.push(format!("{rel_path}: {err:#}"));
                    }
                }
            }
        }

        stats.items_removed = self.remove_missing(&seen, &unreadable, &mut stats.errors)?;
        Ok(stats)
    }

    /// Build the row for a file. Unreadable or unparsable files still get an
    /// item titled after their file stem.
    fn describe(&self, candidate: &Candidate, rel_path: &str, size: i64, mtime: i64) -> NewItem {
        let extracted = match std::fs::read(&candidate.path) {
            Ok(bytes) => self
                .registry
                .for_path(&candidate.path)
                .map(|e| e.extract(&bytes))
                .transpose()
                .unwrap_or_else(|err| {
                    tracing::warn!(path = %rel_path, error = %err, "metadata extraction failed");
                    None
                })
                .unwrap_or_default(),
            Err(err) => {
                tracing::warn!(path = %rel_path, error = %err, "failed to read file");
                ExtractedMeta::default()
            }
        };

        let title = extracted
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| file_stem(&candidate.path));

        NewItem {
            item_type: candidate.item_type,
            path: rel_path.to_string(),
            title,
            folder: folder_of(rel_path),
            size,
            mtime,
            pages: extracted.pages,
            meta: extracted.meta.map(Value::Object),
        }
    }

    /// Delete items whose file was not seen. Items at or below an
    /// `unreadable` path are kept, since a failed walk says nothing about
    /// whether they still exist.
    fn remove_missing(
        &self,
        seen: &HashSet<String>,
        unreadable: &[String],
        errors: &mut Vec<String>,
    ) -> Result<usize> {
        let db = self.lock()?;
        let mut kept = 0;
        let stale: Vec<(i64, String)> = db
            .item_paths()?
            .into_iter()
            .filter(|(_, path)| !seen.contains(path))
            .filter(|(_, path)| {
                let blocked = unreadable.iter().any(|u| is_within(path, u));
                kept += usize::from(blocked);
                !blocked
            })
            .collect();
        if kept > 0 {
            tracing::warn!(
                items = kept,
                unreadable = unreadable.len(),
                "walk incomplete, keeping unseen items under unreadable paths"
            );
        }

        db.with_transaction(|| {
            for (id, _) in &stale {
                db.delete_item(*id)?;
            }
            Ok(())
        })?;
        drop(db);

        for (id, path) in &stale {
            tracing::debug!(item_id = id, path = %path, "removed item");
            if let Err(err) = self.cache.remove(*id) {
                errors.push(format!("{path}: {err:#}"));
            }
        }
        Ok(stale.len())
    }
}

/// True if `path` is `prefix` or lies below it. The empty prefix is the
/// library root.
fn is_within(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
