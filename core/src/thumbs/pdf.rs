use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use image::RgbaImage;
use pdfium_render::prelude::*;

/// `Pdfium` wrapper that can live in a static.
struct SyncPdfium(Pdfium);

// SAFETY: the `thread_safe` feature of pdfium-render serializes every call
// into the pdfium library behind a global lock.
unsafe impl Send for SyncPdfium {}
unsafe impl Sync for SyncPdfium {}

/// Bound once per process; a failed bind is cached too so every later render
/// fails fast with the same message.
static PDFIUM: OnceLock<Result<SyncPdfium, String>> = OnceLock::new();

/// Rasterizes the first page of PDF files through the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfRenderer {
    library_dir: Option<PathBuf>,
}

impl PdfRenderer {
    /// `library_dir` is searched for the platform pdfium library before the
    /// system library path. Only the first renderer to bind decides.
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn pdfium(&self) -> Result<&'static Pdfium> {
        PDFIUM
            .get_or_init(|| bind_pdfium(self.library_dir.as_deref()))
            .as_ref()
            .map(|p| &p.0)
            .map_err(|e| anyhow!("{e}"))
    }

    /// Render page 1 of `path` scaled to `width` pixels wide.
    pub fn render_first_page(&self, path: &Path, width: u32) -> Result<RgbaImage> {
        let pdfium = self.pdfium()?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| anyhow!("failed to open {}: {e:?}", path.display()))?;
        let page = document
            .pages()
            .first()
            .map_err(|e| anyhow!("{} has no first page: {e:?}", path.display()))?;
        let config = PdfRenderConfig::new().set_target_width(width as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| anyhow!("failed to render {}: {e:?}", path.display()))?;
        Ok(bitmap.as_image().to_rgba8())
    }
}

fn bind_pdfium(library_dir: Option<&Path>) -> Result<SyncPdfium, String> {
    if let Some(dir) = library_dir {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(dir);
        match Pdfium::bind_to_library(&lib_path) {
            Ok(bindings) => {
                tracing::info!(path = %lib_path.display(), "using bundled pdfium library");
                return Ok(SyncPdfium(Pdfium::new(bindings)));
            }
            Err(e) => {
                tracing::warn!(path = %lib_path.display(), error = ?e, "failed to bind pdfium library");
            }
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => {
            tracing::info!("using system pdfium library");
            Ok(SyncPdfium(Pdfium::new(bindings)))
        }
        Err(e) => {
            tracing::error!(error = ?e, "no pdfium library available, PDF thumbnails disabled");
            Err(format!("pdfium library not available: {e:?}"))
        }
    }
}
