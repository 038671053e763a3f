pub mod board;
pub mod card;
pub mod pdf;
pub mod raster;

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};

use crate::config::Config;
use crate::db::{now_millis, ThumbnailRecord};
use crate::extract::sgf::parse_game;
use crate::extract::ItemType;
use crate::walker::modified_millis;

use self::board::{render_board, Board};
use self::card::render_card;
use self::pdf::PdfRenderer;

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Detail page.
    Cover,
    /// Shelf tile.
    Grid,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Cover, Variant::Grid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Cover => "cover",
            Variant::Grid => "grid",
        }
    }

    /// Query-string form; anything other than `grid` means cover.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("grid") => Variant::Grid,
            _ => Variant::Cover,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cover" => Ok(Variant::Cover),
            "grid" => Ok(Variant::Grid),
            other => anyhow::bail!("unknown thumbnail variant: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// The source document a thumbnail is made from.
#[derive(Debug, Clone)]
pub struct ThumbSource {
    pub item_id: i64,
    pub item_type: ItemType,
    /// Absolute path of the document.
    pub path: PathBuf,
    /// Document mtime in milliseconds; newer than the PNG means stale.
    pub mtime: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbOutcome {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// False when the cached PNG was still fresh.
    pub rendered: bool,
}

impl ThumbOutcome {
    /// Row to upsert into the thumbnails table.
    pub fn record(&self, item_id: i64, variant: Variant) -> ThumbnailRecord {
        ThumbnailRecord {
            item_id,
            variant,
            path: self.path.to_string_lossy().to_string(),
            width: self.width as i64,
            height: self.height as i64,
            updated_at: now_millis(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// On-disk PNG cache at `{dir}/{item_id}-{variant}.png`.
#[derive(Debug, Clone)]
pub struct ThumbnailCache {
    dir: PathBuf,
    cover_width: u32,
    grid_width: u32,
    pdf: PdfRenderer,
}

impl ThumbnailCache {
    pub fn new(dir: PathBuf, cover_width: u32, grid_width: u32, pdf: PdfRenderer) -> Self {
        Self {
            dir,
            cover_width,
            grid_width,
            pdf,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.thumbs_dir(),
            config.thumb_width,
            config.grid_width,
            PdfRenderer::new(config.pdfium_dir.clone()),
        )
    }

    pub fn width_for(&self, variant: Variant) -> u32 {
        match variant {
            Variant::Cover => self.cover_width,
            Variant::Grid => self.grid_width,
        }
    }

    pub fn path_for(&self, item_id: i64, variant: Variant) -> PathBuf {
        self.dir.join(format!("{item_id}-{variant}.png"))
    }

    /// A thumbnail is stale when its PNG is missing or older than the source.
    pub fn is_stale(&self, thumb_path: &Path, source_mtime: i64) -> bool {
        match std::fs::metadata(thumb_path) {
            Ok(meta) => match modified_millis(&meta) {
                Ok(thumb_mtime) => thumb_mtime < source_mtime,
                Err(_) => true,
            },
            Err(_) => true,
        }
    }

    /// Return the cached PNG for `source`, rendering it first if stale.
    pub fn ensure(&self, source: &ThumbSource, variant: Variant) -> Result<ThumbOutcome> {
        let path = self.path_for(source.item_id, variant);

        if !self.is_stale(&path, source.mtime) {
            if let Ok((width, height)) = image::image_dimensions(&path) {
                return Ok(ThumbOutcome {
                    path,
                    width,
                    height,
                    rendered: false,
                });
            }
            // Unreadable PNG: fall through and replace it.
        }

        let img = self
            .render(source.item_type, &source.path, self.width_for(variant))
            .with_context(|| {
                format!(
                    "failed to render {variant} thumbnail for {}",
                    source.path.display()
                )
            })?;
        write_png(&img, &path)?;
        tracing::debug!(
            item_id = source.item_id,
            variant = %variant,
            width = img.width(),
            height = img.height(),
            "rendered thumbnail"
        );

        Ok(ThumbOutcome {
            path,
            width: img.width(),
            height: img.height(),
            rendered: true,
        })
    }

    /// Rasterize a document at `width` pixels wide.
    pub fn render(&self, item_type: ItemType, source: &Path, width: u32) -> Result<RgbaImage> {
        match item_type {
            ItemType::Pdf => self.pdf.render_first_page(source, width),
            ItemType::Sgf => {
                let text = std::fs::read_to_string(source)
                    .with_context(|| format!("failed to read {}", source.display()))?;
                let board = Board::from_game(&parse_game(&text));
                Ok(render_board(&board, width))
            }
            ItemType::Html => Ok(render_card("HTML", width)),
        }
    }

    /// Delete every cached PNG of an item. Missing files are fine.
    pub fn remove(&self, item_id: i64) -> Result<()> {
        for variant in Variant::ALL {
            let path = self.path_for(item_id, variant);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to remove {}", path.display()));
                }
            }
        }
        Ok(())
    }
}

/// Encode to PNG and move into place so readers never see a partial file.
fn write_png(img: &RgbaImage, path: &Path) -> Result<()> {
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)
        .context("failed to encode PNG")?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    // Unique per write: the indexer and a request may render the same file.
    static NEXT_TMP: AtomicU64 = AtomicU64::new(0);
    let tmp = path.with_extension(format!(
        "png.{}-{}.tmp",
        std::process::id(),
        NEXT_TMP.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&tmp, bytes.into_inner())
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("failed to move thumbnail into {}", path.display()));
    }
    Ok(())
}
