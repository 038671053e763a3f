use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Runtime configuration. Every field has a default so a TOML file only
/// needs to name the values it changes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// Folder tree that gets indexed.
    pub library_root: PathBuf,
    /// Holds the database, the thumbnail cache and `users.json`.
    pub data_root: PathBuf,
    /// Width of the "cover" thumbnail variant in pixels.
    pub thumb_width: u32,
    /// Width of the "grid" thumbnail variant in pixels.
    pub grid_width: u32,
    /// Upper bound on thumbnail renders running at once from HTTP requests.
    pub concurrency_thumbs: usize,
    /// Render HTML placeholder cards during scans instead of on first request.
    pub enable_html_thumbnails: bool,
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin for a client served from elsewhere.
    pub client_origin: Option<String>,
    /// Built client assets served as a single-page app.
    pub client_dist: Option<PathBuf>,
    /// Directory containing the pdfium shared library. Falls back to the
    /// system library search path when unset.
    pub pdfium_dir: Option<PathBuf>,
    /// Rescan when the library folder changes.
    pub watch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library_root: PathBuf::from("library"),
            data_root: PathBuf::from("data"),
            thumb_width: 400,
            grid_width: 260,
            concurrency_thumbs: 2,
            enable_html_thumbnails: false,
            host: "127.0.0.1".to_string(),
            port: 4000,
            client_origin: None,
            client_dist: None,
            pdfium_dir: None,
            watch: true,
        }
    }
}

impl Config {
    pub fn thumbs_dir(&self) -> PathBuf {
        self.data_root.join("thumbs")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_root.join("library.db")
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_root.join("users.json")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve relative roots against `base` so later path comparisons work on
    /// absolute paths.
    pub fn absolutize(mut self, base: &Path) -> Self {
        if self.library_root.is_relative() {
            self.library_root = base.join(&self.library_root);
        }
        if self.data_root.is_relative() {
            self.data_root = base.join(&self.data_root);
        }
        if let Some(dist) = self.client_dist.take() {
            self.client_dist = Some(if dist.is_relative() { base.join(dist) } else { dist });
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.thumb_width == 0 {
            anyhow::bail!("thumb_width must be > 0");
        }
        if self.grid_width == 0 {
            anyhow::bail!("grid_width must be > 0");
        }
        if self.concurrency_thumbs == 0 {
            anyhow::bail!("concurrency_thumbs must be >= 1");
        }
        Ok(())
    }

    /// Create the data and thumbnail directories if they do not exist yet.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.thumbs_dir()).with_context(|| {
            format!("failed to create data directory {}", self.data_root.display())
        })?;
        Ok(())
    }
}

/// Read a TOML config file. Missing keys take their defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
