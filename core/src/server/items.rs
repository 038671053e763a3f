use std::io::SeekFrom;

use anyhow::{anyhow, Context};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::{parse_id, ApiError, ApiResult, AppState};
use crate::db::{Item, ItemQuery, ItemSort, ListedItem, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::extract::ItemType;
use crate::files::{mime_for, parse_range, resolve_html_asset, resolve_library_path};
use crate::thumbs::{ThumbSource, Variant};

/// URL the client loads a thumbnail from.
pub fn thumbnail_url(item_id: i64, variant: Variant) -> String {
    format!("/api/thumbnails/{item_id}?variant={variant}")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// GET /api/items
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub folder: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub favorites: Option<String>,
    pub user_id: Option<String>,
}

impl ListParams {
    /// Lenient like the client expects: unparsable paging falls back to the
    /// defaults, but an unknown type or a favorites filter without a user is
    /// rejected.
    pub fn into_query(self) -> ApiResult<ItemQuery> {
        let item_type = match non_empty(self.item_type) {
            Some(t) => Some(
                t.parse::<ItemType>()
                    .map_err(|_| ApiError::bad_request(format!("Unknown item type: {t}")))?,
            ),
            None => None,
        };

        let user_id = non_empty(self.user_id);
        let favorites_of = if self.favorites.as_deref() == Some("true") {
            Some(
                user_id
                    .clone()
                    .ok_or_else(|| ApiError::bad_request("Favorites filter requires userId"))?,
            )
        } else {
            None
        };

        let page = self
            .page
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|&p| p > 0)
            .unwrap_or(1);
        let limit = self
            .limit
            .and_then(|l| l.trim().parse::<u32>().ok())
            .filter(|&l| l > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);

        let sort = match self.sort.as_deref() {
            Some(s) => s.parse().unwrap_or_default(),
            None => ItemSort::default(),
        };

        Ok(ItemQuery {
            item_type,
            folder: non_empty(self.folder),
            search: non_empty(self.q),
            sort,
            page,
            limit,
            favorites_of,
            user_id,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    #[serde(flatten)]
    pub item: Item,
    pub grid_thumb: Option<String>,
}

impl From<ListedItem> for ItemSummary {
    fn from(listed: ListedItem) -> Self {
        let grid_thumb = listed
            .has_grid_thumb
            .then(|| thumbnail_url(listed.item.id, Variant::Grid));
        Self {
            item: listed.item,
            grid_thumb,
        }
    }
}

pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<ItemSummary>>> {
    let query = params.into_query()?;
    let items = state.db()?.list_items(&query)?;
    Ok(Json(items.into_iter().map(ItemSummary::from).collect()))
}

// ---------------------------------------------------------------------------
// GET /api/items/{id}
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: Item,
    pub cover_path: Option<String>,
    pub grid_path: Option<String>,
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<Json<ItemDetail>> {
    let id = parse_id(&item_id, "item id")?;
    let detail = {
        let db = state.db()?;
        let item = db
            .get_item(id)?
            .ok_or_else(|| ApiError::not_found("Item not found"))?;
        let cover = db.get_thumbnail(id, Variant::Cover)?;
        let grid = db.get_thumbnail(id, Variant::Grid)?;
        ItemDetail {
            item,
            cover_path: cover.map(|t| thumbnail_url(t.item_id, Variant::Cover)),
            grid_path: grid.map(|t| thumbnail_url(t.item_id, Variant::Grid)),
        }
    };
    Ok(Json(detail))
}

// ---------------------------------------------------------------------------
// GET /api/items/{id}/content
// ---------------------------------------------------------------------------

pub async fn item_content(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = parse_id(&item_id, "item id")?;
    let item = state.item(id)?;
    let full_path = resolve_library_path(&state.config.library_root, &item.path)?;
    let metadata = match tokio::fs::metadata(&full_path).await {
        Ok(m) if m.is_file() => m,
        _ => return Err(ApiError::not_found("Missing file")),
    };

    match item.item_type {
        ItemType::Pdf => {
            let range_header = headers
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok());
            stream_file(&full_path, metadata.len(), range_header).await
        }
        ItemType::Sgf | ItemType::Html => {
            let bytes = tokio::fs::read(&full_path)
                .await
                .with_context(|| format!("failed to read {}", full_path.display()))?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            Ok((
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                text,
            )
                .into_response())
        }
    }
}

/// Stream a file, honoring a `Range` header with a 206 partial response.
async fn stream_file(
    path: &std::path::Path,
    size: u64,
    range_header: Option<&str>,
) -> ApiResult<Response> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mime = mime_for(path);

    let response = match parse_range(range_header, size) {
        Some(range) => {
            file.seek(SeekFrom::Start(range.start))
                .await
                .with_context(|| format!("failed to seek {}", path.display()))?;
            let body = Body::from_stream(ReaderStream::new(file.take(range.byte_count())));
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CONTENT_LENGTH, range.byte_count())
                .header(header::CONTENT_RANGE, range.content_range(size))
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
        }
        None => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime)
            .header(header::CONTENT_LENGTH, size)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from_stream(ReaderStream::new(file))),
    };
    response
        .context("failed to build response")
        .map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// GET /api/items/{id}/html/{*asset}
// ---------------------------------------------------------------------------

pub async fn html_document(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<Response> {
    serve_html_asset(&state, &item_id, "").await
}

pub async fn html_asset(
    State(state): State<AppState>,
    Path((item_id, asset)): Path<(String, String)>,
) -> ApiResult<Response> {
    serve_html_asset(&state, &item_id, &asset).await
}

async fn serve_html_asset(state: &AppState, item_id: &str, asset: &str) -> ApiResult<Response> {
    let id = parse_id(item_id, "item id")?;
    let item = state.item(id)?;
    if item.item_type != ItemType::Html {
        return Err(ApiError::not_found("Not an HTML item"));
    }

    let target = resolve_html_asset(&state.config.library_root, &item.path, asset)?;
    let bytes = tokio::fs::read(&target)
        .await
        .with_context(|| format!("failed to read {}", target.display()))?;
    Ok(([(header::CONTENT_TYPE, mime_for(&target))], bytes).into_response())
}

// ---------------------------------------------------------------------------
// GET /api/thumbnails/{id}
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ThumbParams {
    pub variant: Option<String>,
}

pub async fn thumbnail(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Query(params): Query<ThumbParams>,
) -> ApiResult<Response> {
    let id = parse_id(&item_id, "item id")?;
    let variant = Variant::from_query(params.variant.as_deref());
    let item = state.item(id)?;
    let source = ThumbSource {
        item_id: id,
        item_type: item.item_type,
        path: resolve_library_path(&state.config.library_root, &item.path)?,
        mtime: item.mtime,
    };

    let outcome = {
        let _permit = state
            .thumb_permits
            .acquire()
            .await
            .context("thumbnail queue closed")?;
        let cache = state.cache.clone();
        tokio::task::spawn_blocking(move || cache.ensure(&source, variant))
            .await
            .context("thumbnail task failed")?
            .map_err(|err| {
                tracing::warn!(item_id = id, variant = %variant, error = %err, "thumbnail render failed");
                ApiError::Internal(anyhow!("Could not render thumbnail"))
            })?
    };

    {
        let db = state.db()?;
        if (outcome.rendered || db.get_thumbnail(id, variant)?.is_none())
            && !db.upsert_thumbnail(&outcome.record(id, variant))?
        {
            // Removed by a scan while rendering.
            return Err(ApiError::not_found("Item not found"));
        }
    }

    let png = tokio::fs::read(&outcome.path)
        .await
        .with_context(|| format!("failed to read {}", outcome.path.display()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        png,
    )
        .into_response())
}
