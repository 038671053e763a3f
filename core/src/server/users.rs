use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_id, ApiError, ApiResult, AppState};
use crate::db::{Database, Item, PdfBookmark, RecentEntry, User};
use crate::users::initialize_users;

const DEFAULT_RECENTS: i64 = 50;
const MAX_RECENTS: i64 = 500;

/// Writes must name a known user and item.
fn require_user_and_item(db: &Database, user_id: &str, item_id: i64) -> ApiResult<()> {
    if !db.user_exists(user_id)? {
        return Err(ApiError::not_found("User not found"));
    }
    if db.get_item(item_id)?.is_none() {
        return Err(ApiError::not_found("Item not found"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Users are re-read from `users.json` on every listing so edits to the file
/// show up without a restart.
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    let users_file = state.config.users_file();
    let users = initialize_users(&*state.db()?, &users_file)?;
    Ok(Json(users))
}

pub async fn management_disabled() -> ApiError {
    ApiError::MethodNotAllowed(
        "User management is disabled. Update data/users.json to change users.".to_string(),
    )
}

// ---------------------------------------------------------------------------
// Favorites
// ---------------------------------------------------------------------------

pub async fn list_favorites(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Item>>> {
    Ok(Json(state.db()?.list_favorites(&user_id)?))
}

pub async fn add_favorite(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let item_id = parse_id(&item_id, "item id")?;
    let db = state.db()?;
    require_user_and_item(&db, &user_id, item_id)?;
    db.add_favorite(&user_id, item_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let item_id = parse_id(&item_id, "item id")?;
    state.db()?.remove_favorite(&user_id, item_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// PDF position and bookmarks
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct PdfPosition {
    pub page: i64,
}

pub async fn get_pdf_position(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> ApiResult<Json<PdfPosition>> {
    let item_id = parse_id(&item_id, "item id")?;
    let page = state.db()?.get_pdf_position(&user_id, item_id)?.unwrap_or(1);
    Ok(Json(PdfPosition { page }))
}

pub async fn set_pdf_position(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
    body: Result<Json<PdfPosition>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let item_id = parse_id(&item_id, "item id")?;
    let Json(position) = body?;
    if position.page < 1 {
        return Err(ApiError::bad_request("page must be >= 1"));
    }
    let db = state.db()?;
    require_user_and_item(&db, &user_id, item_id)?;
    db.set_pdf_position(&user_id, item_id, position.page)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_bookmarks(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<PdfBookmark>>> {
    let item_id = parse_id(&item_id, "item id")?;
    Ok(Json(state.db()?.list_pdf_bookmarks(&user_id, item_id)?))
}

#[derive(Debug, Deserialize)]
pub struct NewBookmark {
    pub page: i64,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedBookmark {
    pub id: i64,
    pub page: i64,
    pub note: Option<String>,
}

pub async fn add_bookmark(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
    body: Result<Json<NewBookmark>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatedBookmark>)> {
    let item_id = parse_id(&item_id, "item id")?;
    let Json(new) = body?;
    if new.page < 1 {
        return Err(ApiError::bad_request("page must be >= 1"));
    }
    let bookmark = {
        let db = state.db()?;
        require_user_and_item(&db, &user_id, item_id)?;
        db.add_pdf_bookmark(&user_id, item_id, new.page, new.note.as_deref())?
    };
    Ok((
        StatusCode::CREATED,
        Json(CreatedBookmark {
            id: bookmark.id,
            page: bookmark.page,
            note: bookmark.note,
        }),
    ))
}

pub async fn delete_bookmark(
    State(state): State<AppState>,
    Path((user_id, bookmark_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let bookmark_id = parse_id(&bookmark_id, "bookmark id")?;
    state.db()?.delete_pdf_bookmark(&user_id, bookmark_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// SGF position and node favorites
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SgfPosition {
    pub node_index: i64,
}

pub async fn get_sgf_position(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> ApiResult<Json<SgfPosition>> {
    let item_id = parse_id(&item_id, "item id")?;
    let node_index = state.db()?.get_sgf_position(&user_id, item_id)?.unwrap_or(0);
    Ok(Json(SgfPosition { node_index }))
}

pub async fn set_sgf_position(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
    body: Result<Json<SgfPosition>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let item_id = parse_id(&item_id, "item id")?;
    let Json(position) = body?;
    if position.node_index < 0 {
        return Err(ApiError::bad_request("nodeIndex must be >= 0"));
    }
    let db = state.db()?;
    require_user_and_item(&db, &user_id, item_id)?;
    db.set_sgf_position(&user_id, item_id, position.node_index)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_node_favorites(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<i64>>> {
    let item_id = parse_id(&item_id, "item id")?;
    Ok(Json(state.db()?.list_sgf_node_favorites(&user_id, item_id)?))
}

fn parse_node_index(raw: &str) -> ApiResult<i64> {
    let node_index = parse_id(raw, "node index")?;
    if node_index < 0 {
        return Err(ApiError::bad_request("node index must be >= 0"));
    }
    Ok(node_index)
}

pub async fn add_node_favorite(
    State(state): State<AppState>,
    Path((user_id, item_id, node_index)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    let item_id = parse_id(&item_id, "item id")?;
    let node_index = parse_node_index(&node_index)?;
    let db = state.db()?;
    require_user_and_item(&db, &user_id, item_id)?;
    db.add_sgf_node_favorite(&user_id, item_id, node_index)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_node_favorite(
    State(state): State<AppState>,
    Path((user_id, item_id, node_index)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    let item_id = parse_id(&item_id, "item id")?;
    let node_index = parse_node_index(&node_index)?;
    state
        .db()?
        .remove_sgf_node_favorite(&user_id, item_id, node_index)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Recents
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RecentsParams {
    pub limit: Option<String>,
}

pub async fn list_recents(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<RecentsParams>,
) -> ApiResult<Json<Vec<RecentEntry>>> {
    let limit = params
        .limit
        .and_then(|l| l.trim().parse::<i64>().ok())
        .filter(|&l| l > 0)
        .unwrap_or(DEFAULT_RECENTS)
        .min(MAX_RECENTS);
    Ok(Json(state.db()?.list_recents(&user_id, limit)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecent {
    pub item_id: i64,
}

pub async fn add_recent(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Result<Json<NewRecent>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(recent) = body?;
    let db = state.db()?;
    require_user_and_item(&db, &user_id, recent.item_id)?;
    db.add_recent(&user_id, recent.item_id)?;
    Ok(StatusCode::CREATED)
}
