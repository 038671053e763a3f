use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use shelf_core::config::{load_config, Config};
use shelf_core::db::Database;
use shelf_core::extract::ExtractorRegistry;
use shelf_core::indexer::Indexer;
use shelf_core::server::{self, AppState};
use shelf_core::thumbs::ThumbnailCache;
use shelf_core::users::initialize_users;
use shelf_core::watcher::{run_rescans, LibraryWatcher, DEFAULT_DEBOUNCE_MS};

#[derive(Parser)]
#[command(name = "shelf", about = "Personal library server for PDF, SGF and HTML documents")]
struct Cli {
    /// TOML config file; flags and environment variables override it
    #[arg(long, env = "SHELF_CONFIG")]
    config: Option<PathBuf>,

    /// Folder tree to index
    #[arg(long, env = "LIBRARY_ROOT")]
    library_root: Option<PathBuf>,

    /// Database, thumbnails and users.json live here
    #[arg(long, env = "DATA_ROOT")]
    data_root: Option<PathBuf>,

    #[arg(long, env = "THUMB_WIDTH")]
    thumb_width: Option<u32>,

    #[arg(long, env = "GRID_WIDTH")]
    grid_width: Option<u32>,

    /// Thumbnail renders allowed at once from requests
    #[arg(long, env = "CONCURRENCY_THUMBS")]
    concurrency_thumbs: Option<usize>,

    /// Render HTML cards during scans
    #[arg(long, env = "ENABLE_HTML_THUMBNAILS", value_parser = clap::builder::BoolishValueParser::new())]
    enable_html_thumbnails: Option<bool>,

    #[arg(long, env = "HOST")]
    host: Option<String>,

    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Allowed CORS origin
    #[arg(long, env = "CLIENT_ORIGIN")]
    client_origin: Option<String>,

    /// Built client to serve as a single-page app
    #[arg(long, env = "CLIENT_DIST")]
    client_dist: Option<PathBuf>,

    /// Directory holding the pdfium shared library
    #[arg(long, env = "PDFIUM_DIR")]
    pdfium_dir: Option<PathBuf>,

    /// Do not rescan when the library changes
    #[arg(long)]
    no_watch: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => Config::default(),
        };

        if let Some(v) = self.library_root {
            config.library_root = v;
        }
        if let Some(v) = self.data_root {
            config.data_root = v;
        }
        if let Some(v) = self.thumb_width {
            config.thumb_width = v;
        }
        if let Some(v) = self.grid_width {
            config.grid_width = v;
        }
        if let Some(v) = self.concurrency_thumbs {
            config.concurrency_thumbs = v;
        }
        if let Some(v) = self.enable_html_thumbnails {
            config.enable_html_thumbnails = v;
        }
        if let Some(v) = self.host {
            config.host = v;
        }
        if let Some(v) = self.port {
            config.port = v;
        }
        if self.client_origin.is_some() {
            config.client_origin = self.client_origin;
        }
        if self.client_dist.is_some() {
            config.client_dist = self.client_dist;
        }
        if self.pdfium_dir.is_some() {
            config.pdfium_dir = self.pdfium_dir;
        }
        if self.no_watch {
            config.watch = false;
        }

        let cwd = std::env::current_dir().context("failed to determine working directory")?;
        let config = config.absolutize(&cwd);
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shelf=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Cli::parse().into_config()?;
    tracing::info!(
        library = %config.library_root.display(),
        data = %config.data_root.display(),
        "starting shelf"
    );
    config.ensure_directories()?;

    let db_path = config.database_path();
    let db_path_str = db_path.to_string_lossy().to_string();
    tracing::info!(db = %db_path_str, "opening database");
    let db = Database::open(&db_path_str)?;

    let users = initialize_users(&db, &config.users_file())?;
    tracing::info!(users = users.len(), "loaded users");

    let db = Arc::new(Mutex::new(db));
    let registry = Arc::new(ExtractorRegistry::new());
    let cache = ThumbnailCache::from_config(&config);
    let shutdown = CancellationToken::new();

    // Initial scan before serving so the first listing is complete.
    {
        let db = Arc::clone(&db);
        let registry = Arc::clone(&registry);
        let cache = cache.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || run_scan(&db, &registry, &cache, &config)).await?;
    }

    if config.watch {
        let db = Arc::clone(&db);
        let registry = Arc::clone(&registry);
        let cache = cache.clone();
        let config = config.clone();
        let shutdown = shutdown.clone();
        tokio::task::spawn_blocking(move || {
            let watcher = match LibraryWatcher::new(&config.library_root, DEFAULT_DEBOUNCE_MS) {
                Ok(w) => w,
                Err(e) => {
                    tracing::error!(error = %e, "failed to start library watcher");
                    return;
                }
            };
            tracing::info!("library watcher started");
            run_rescans(&watcher, &shutdown, || {
                run_scan(&db, &registry, &cache, &config)
            });
        });
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for CTRL+C");
                return;
            }
            tracing::info!("shutting down");
            shutdown.cancel();
        });
    }

    let state = AppState::with_cache(db, config, cache);
    server::serve(state, shutdown).await
}

/// One full scan. Failures are logged; the server keeps running.
fn run_scan(
    db: &Mutex<Database>,
    registry: &ExtractorRegistry,
    cache: &ThumbnailCache,
    config: &Config,
) {
    let indexer = Indexer::from_config(db, registry, cache, config);
    match indexer.scan_library() {
        Ok(stats) => {
            tracing::info!(
                files = stats.files_seen,
                upserted = stats.items_upserted,
                thumbnails = stats.thumbnails_rendered,
                removed = stats.items_removed,
                errors = stats.errors.len(),
                "scan complete"
            );
            for err in &stats.errors {
                tracing::warn!(error = %err, "scan error");
            }
        }
        Err(e) => tracing::error!(error = %e, "library scan failed"),
    }
}
