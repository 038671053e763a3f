//! HTTP API for the shelf client.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Status, version and item count |
//! | `GET` | `/api/items` | Filtered, paginated item list |
//! | `GET` | `/api/items/{id}` | One item with thumbnail URLs |
//! | `GET` | `/api/items/{id}/content` | Document bytes (PDF supports `Range`) |
//! | `GET` | `/api/items/{id}/html/{*asset}` | HTML document and sibling assets |
//! | `GET` | `/api/thumbnails/{id}` | Cover or grid PNG, rendered on demand |
//! | `GET` | `/api/users` | Users from `users.json` |
//! | | `/api/users/{id}/...` | Favorites, reading positions, bookmarks, recents |
//!
//! Errors are JSON: `{"error": "<message>"}`.

pub mod error;
pub mod items;
pub mod users;

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, patch, put};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

use crate::config::Config;
use crate::db::{Database, Item};
use crate::thumbs::ThumbnailCache;

pub use self::error::{ApiError, ApiResult};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub config: Arc<Config>,
    pub cache: Arc<ThumbnailCache>,
    /// Bounds thumbnail renders started by requests.
    pub thumb_permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(db: Arc<Mutex<Database>>, config: Config) -> Self {
        let cache = ThumbnailCache::from_config(&config);
        Self::with_cache(db, config, cache)
    }

    pub fn with_cache(db: Arc<Mutex<Database>>, config: Config, cache: ThumbnailCache) -> Self {
        let permits = config.concurrency_thumbs.max(1);
        Self {
            db,
            config: Arc::new(config),
            cache: Arc::new(cache),
            thumb_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn db(&self) -> ApiResult<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|e| ApiError::Internal(anyhow!("lock error: {e}")))
    }

    /// The item with `id`, or 404.
    pub fn item(&self, id: i64) -> ApiResult<Item> {
        self.db()?
            .get_item(id)?
            .ok_or_else(|| ApiError::not_found("Item not found"))
    }
}

/// Path ids arrive as strings so a bad one gets a JSON 400 like every other
/// error.
pub fn parse_id(raw: &str, what: &str) -> ApiResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {what}: {raw}")))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/users",
            get(users::list_users).post(users::management_disabled),
        )
        .route(
            "/api/users/{user_id}",
            patch(users::management_disabled).delete(users::management_disabled),
        )
        .route("/api/users/{user_id}/favorites", get(users::list_favorites))
        .route(
            "/api/users/{user_id}/favorites/{item_id}",
            put(users::add_favorite).delete(users::remove_favorite),
        )
        .route(
            "/api/users/{user_id}/pdf/{item_id}/position",
            get(users::get_pdf_position).put(users::set_pdf_position),
        )
        .route(
            "/api/users/{user_id}/pdf/{item_id}/bookmarks",
            get(users::list_bookmarks).post(users::add_bookmark),
        )
        .route(
            "/api/users/{user_id}/pdf/bookmarks/{bookmark_id}",
            delete(users::delete_bookmark),
        )
        .route(
            "/api/users/{user_id}/sgf/{item_id}/position",
            get(users::get_sgf_position).put(users::set_sgf_position),
        )
        .route(
            "/api/users/{user_id}/sgf/{item_id}/node-favs",
            get(users::list_node_favorites),
        )
        .route(
            "/api/users/{user_id}/sgf/{item_id}/node-favs/{node_index}",
            put(users::add_node_favorite).delete(users::remove_node_favorite),
        )
        .route(
            "/api/users/{user_id}/recents",
            get(users::list_recents).post(users::add_recent),
        )
        .route("/api/items", get(items::list_items))
        .route("/api/items/{item_id}", get(items::get_item))
        .route("/api/items/{item_id}/content", get(items::item_content))
        .route("/api/items/{item_id}/html", get(items::html_document))
        .route("/api/items/{item_id}/html/", get(items::html_document))
        .route("/api/items/{item_id}/html/{*asset}", get(items::html_asset))
        .route("/api/thumbnails/{item_id}", get(items::thumbnail));

    let mut app = api.with_state(state.clone());

    if let Some(dist) = state.config.client_dist.as_ref().filter(|d| d.is_dir()) {
        tracing::info!(dir = %dist.display(), "serving client build");
        let spa = ServeDir::new(dist).fallback(ServeFile::new(dist.join("index.html")));
        app = app.fallback_service(spa);
    }

    if let Some(origin) = state.config.client_origin.as_deref() {
        match HeaderValue::from_str(origin) {
            Ok(origin) => {
                app = app.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::PATCH,
                            Method::DELETE,
                        ])
                        .allow_headers(Any),
                );
            }
            Err(e) => tracing::warn!(origin, error = %e, "ignoring invalid client origin"),
        }
    }

    app
}

/// Bind the configured address and serve until `shutdown` is cancelled.
pub async fn serve(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_addr();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "serving HTTP API");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    items: i64,
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let items = state.db()?.item_count()?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        items,
    }))
}
