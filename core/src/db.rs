use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;

use crate::extract::ItemType;
use crate::thumbs::Variant;

/// Backslash-escape the LIKE wildcards so a search matches them literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Milliseconds since the Unix epoch; every timestamp column uses this unit.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Migrations
// ---------------------------------------------------------------------------

/// Ordered, named schema migrations. Names are recorded in the `migrations`
/// table and never re-applied.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_library.sql",
        "
        CREATE TABLE items (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            type       TEXT NOT NULL CHECK (type IN ('pdf', 'sgf', 'html')),
            path       TEXT NOT NULL UNIQUE,
            title      TEXT NOT NULL,
            folder     TEXT NOT NULL DEFAULT '',
            size       INTEGER NOT NULL,
            mtime      INTEGER NOT NULL,
            pages      INTEGER,
            meta       TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE thumbnails (
            item_id    INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            variant    TEXT NOT NULL CHECK (variant IN ('cover', 'grid')),
            path       TEXT NOT NULL,
            width      INTEGER NOT NULL,
            height     INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (item_id, variant)
        );

        CREATE INDEX idx_items_type       ON items(type);
        CREATE INDEX idx_items_folder     ON items(folder);
        CREATE INDEX idx_items_updated_at ON items(updated_at);
        ",
    ),
    (
        "002_users.sql",
        "
        CREATE TABLE users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            preferences TEXT NOT NULL DEFAULT '{}',
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        CREATE TABLE favorites (
            user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            item_id    INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, item_id)
        );

        CREATE TABLE pdf_positions (
            user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            item_id    INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            page       INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, item_id)
        );

        CREATE TABLE pdf_bookmarks (
            id         INTEGER PRIMARY KEY,
            user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            item_id    INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            page       INTEGER NOT NULL,
            note       TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE sgf_positions (
            user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            item_id    INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            node_index INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, item_id)
        );

        CREATE TABLE sgf_node_favorites (
            user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            item_id    INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            node_index INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, item_id, node_index)
        );

        CREATE TABLE recents (
            id      INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            ts      INTEGER NOT NULL
        );

        CREATE INDEX idx_pdf_bookmarks_user_item ON pdf_bookmarks(user_id, item_id);
        CREATE INDEX idx_recents_user_ts         ON recents(user_id, ts);
        CREATE INDEX idx_recents_item            ON recents(item_id, ts);
        ",
    ),
];

// ---------------------------------------------------------------------------
// Data structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub path: String,
    pub title: String,
    pub folder: String,
    pub size: i64,
    pub mtime: i64,
    pub pages: Option<i64>,
    pub meta: Option<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Everything the indexer knows about a file before it has a row id.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub item_type: ItemType,
    pub path: String,
    pub title: String,
    pub folder: String,
    pub size: i64,
    pub mtime: i64,
    pub pages: Option<i64>,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ListedItem {
    pub item: Item,
    pub has_grid_thumb: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRecord {
    pub item_id: i64,
    pub variant: Variant,
    pub path: String,
    pub width: i64,
    pub height: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub preferences: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfBookmark {
    pub id: i64,
    pub page: i64,
    pub note: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEntry {
    pub item_id: i64,
    pub ts: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
}

// ---------------------------------------------------------------------------
// Item queries
// ---------------------------------------------------------------------------

pub const DEFAULT_PAGE_SIZE: u32 = 40;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemSort {
    #[default]
    UpdatedAt,
    Title,
    /// Most recently added to the library.
    Recent,
    LastOpened,
}

impl FromStr for ItemSort {
    type Err = std::convert::Infallible;

    /// Unknown values fall back to the default ordering.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "title" => ItemSort::Title,
            "recent" => ItemSort::Recent,
            "lastOpened" => ItemSort::LastOpened,
            _ => ItemSort::UpdatedAt,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ItemQuery {
    pub item_type: Option<ItemType>,
    pub folder: Option<String>,
    /// Substring matched against title and path.
    pub search: Option<String>,
    pub sort: ItemSort,
    /// 1-based.
    pub page: u32,
    pub limit: u32,
    /// Only items this user has favorited.
    pub favorites_of: Option<String>,
    /// Restricts `LastOpened` ordering to this user's history.
    pub user_id: Option<String>,
}

impl Default for ItemQuery {
    fn default() -> Self {
        Self {
            item_type: None,
            folder: None,
            search: None,
            sort: ItemSort::default(),
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            favorites_of: None,
            user_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SQL conversions
// ---------------------------------------------------------------------------

impl ToSql for ItemType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ItemType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Variant {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Variant {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}

const ITEM_COLUMNS: &str =
    "items.id, items.type, items.path, items.title, items.folder, items.size, items.mtime,
     items.pages, items.meta, items.created_at, items.updated_at";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let meta: Option<String> = row.get(8)?;
    Ok(Item {
        id: row.get(0)?,
        item_type: row.get(1)?,
        path: row.get(2)?,
        title: row.get(3)?,
        folder: row.get(4)?,
        size: row.get(5)?,
        mtime: row.get(6)?,
        pages: row.get(7)?,
        meta: meta.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .context("failed to open in-memory database")?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.migrate()?;
        Ok(db)
    }

    fn apply_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Execute `f` inside an IMMEDIATE transaction. Commits on Ok, rolls back on Err.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f() {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS migrations (
                id         INTEGER PRIMARY KEY,
                name       TEXT NOT NULL UNIQUE,
                applied_at INTEGER NOT NULL
            );",
        )?;

        let applied = self.applied_migrations()?;
        for (name, sql) in MIGRATIONS {
            if applied.iter().any(|a| a == name) {
                continue;
            }
            self.with_transaction(|| {
                self.conn
                    .execute_batch(sql)
                    .with_context(|| format!("migration {name} failed"))?;
                self.conn.execute(
                    "INSERT INTO migrations (name, applied_at) VALUES (?1, ?2)",
                    params![name, now_millis()],
                )?;
                Ok(())
            })?;
            tracing::debug!(migration = *name, "applied migration");
        }
        Ok(())
    }

    pub fn applied_migrations(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM migrations ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    /// Insert or update the item at `item.path`, returning its id. `created_at`
    /// survives updates; `updated_at` only moves when the file changed.
    pub fn upsert_item(&self, item: &NewItem, now: i64) -> Result<i64> {
        let meta = item.meta.as_ref().map(|m| m.to_string());
        self.conn.execute(
            "INSERT INTO items (type, path, title, folder, size, mtime, pages, meta, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(path) DO UPDATE SET
                 updated_at = CASE
                     WHEN items.mtime != excluded.mtime
                       OR items.size  != excluded.size
                       OR items.title != excluded.title
                     THEN excluded.updated_at
                     ELSE items.updated_at
                 END,
                 type   = excluded.type,
                 title  = excluded.title,
                 folder = excluded.folder,
                 size   = excluded.size,
                 mtime  = excluded.mtime,
                 pages  = excluded.pages,
                 meta   = excluded.meta",
            params![
                item.item_type,
                item.path,
                item.title,
                item.folder,
                item.size,
                item.mtime,
                item.pages,
                meta,
                now
            ],
        )?;
        // last_insert_rowid is stale on the UPDATE path of an upsert.
        let id: i64 = self.conn.query_row(
            "SELECT id FROM items WHERE path = ?1",
            params![item.path],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let r = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE items.id = ?1"),
                params![id],
                item_from_row,
            )
            .optional()?;
        Ok(r)
    }

    pub fn get_item_by_path(&self, path: &str) -> Result<Option<Item>> {
        let r = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE items.path = ?1"),
                params![path],
                item_from_row,
            )
            .optional()?;
        Ok(r)
    }

    /// `(id, path)` for every indexed item.
    pub fn item_paths(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare("SELECT id, path FROM items ORDER BY path")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Delete an item; thumbnails and per-user rows go with it.
    pub fn delete_item(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn item_count(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))?;
        Ok(n)
    }

    pub fn list_items(&self, query: &ItemQuery) -> Result<Vec<ListedItem>> {
        let mut join_clause = "";
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(user_id) = &query.favorites_of {
            join_clause =
                "INNER JOIN favorites ON favorites.item_id = items.id AND favorites.user_id = ?";
            args.push(SqlValue::Text(user_id.clone()));
        }
        if let Some(t) = query.item_type {
            clauses.push("items.type = ?");
            args.push(SqlValue::Text(t.as_str().to_string()));
        }
        if let Some(folder) = &query.folder {
            clauses.push("items.folder = ?");
            args.push(SqlValue::Text(folder.clone()));
        }
        if let Some(q) = &query.search {
            clauses.push("(items.title LIKE ? ESCAPE '\\' OR items.path LIKE ? ESCAPE '\\')");
            let pattern = format!("%{}%", escape_like(q));
            args.push(SqlValue::Text(pattern.clone()));
            args.push(SqlValue::Text(pattern));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let order_by = match query.sort {
            ItemSort::UpdatedAt => "ORDER BY items.updated_at DESC, items.id DESC".to_string(),
            ItemSort::Title => "ORDER BY items.title COLLATE NOCASE ASC, items.id ASC".to_string(),
            ItemSort::Recent => "ORDER BY items.created_at DESC, items.id DESC".to_string(),
            ItemSort::LastOpened => {
                let user_filter = match &query.user_id {
                    Some(user_id) => {
                        args.push(SqlValue::Text(user_id.clone()));
                        "AND recents.user_id = ?"
                    }
                    None => "",
                };
                format!(
                    "ORDER BY COALESCE((SELECT MAX(ts) FROM recents
                                        WHERE recents.item_id = items.id {user_filter}), 0) DESC,
                              items.id DESC"
                )
            }
        };

        let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        let offset = (query.page.max(1) - 1) as i64 * limit as i64;
        args.push(SqlValue::Integer(limit as i64));
        args.push(SqlValue::Integer(offset));

        let sql = format!(
            "SELECT {ITEM_COLUMNS},
                    EXISTS(SELECT 1 FROM thumbnails
                           WHERE thumbnails.item_id = items.id AND thumbnails.variant = 'grid')
             FROM items
             {join_clause}
             {where_clause}
             {order_by}
             LIMIT ? OFFSET ?"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok(ListedItem {
                item: item_from_row(row)?,
                has_grid_thumb: row.get(11)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Thumbnails
    // -----------------------------------------------------------------------

    /// Insert or refresh a thumbnail row. Returns false without writing when
    /// the item no longer exists.
    pub fn upsert_thumbnail(&self, thumb: &ThumbnailRecord) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT INTO thumbnails (item_id, variant, path, width, height, updated_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6 WHERE EXISTS (SELECT 1 FROM items WHERE id = ?1)
             ON CONFLICT(item_id, variant) DO UPDATE SET path       = excluded.path,
                                                         width      = excluded.width,
                                                         height     = excluded.height,
                                                         updated_at = excluded.updated_at",
            params![
                thumb.item_id,
                thumb.variant,
                thumb.path,
                thumb.width,
                thumb.height,
                thumb.updated_at
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get_thumbnail(&self, item_id: i64, variant: Variant) -> Result<Option<ThumbnailRecord>> {
        let r = self
            .conn
            .query_row(
                "SELECT item_id, variant, path, width, height, updated_at
                 FROM thumbnails WHERE item_id = ?1 AND variant = ?2",
                params![item_id, variant],
                |row| {
                    Ok(ThumbnailRecord {
                        item_id: row.get(0)?,
                        variant: row.get(1)?,
                        path: row.get(2)?,
                        width: row.get(3)?,
                        height: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(r)
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Make the users table mirror `users` exactly: upsert each `(id, name)`,
    /// keep existing preferences, drop everyone else.
    pub fn sync_users(&self, users: &[(String, String)]) -> Result<()> {
        let now = now_millis();
        self.with_transaction(|| {
            for (id, name) in users {
                self.conn.execute(
                    "INSERT INTO users (id, name, preferences, created_at, updated_at)
                     VALUES (?1, ?2, '{}', ?3, ?3)
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                                                   updated_at = excluded.updated_at",
                    params![id, name, now],
                )?;
            }
            if users.is_empty() {
                self.conn.execute("DELETE FROM users", [])?;
            } else {
                let placeholders = vec!["?"; users.len()].join(",");
                self.conn.execute(
                    &format!("DELETE FROM users WHERE id NOT IN ({placeholders})"),
                    params_from_iter(users.iter().map(|(id, _)| id)),
                )?;
            }
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let r = self
            .conn
            .query_row(
                "SELECT id, name, preferences FROM users WHERE id = ?1",
                params![id],
                |row| {
                    let prefs: String = row.get(2)?;
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        preferences: serde_json::from_str(&prefs)
                            .unwrap_or_else(|_| Value::Object(Default::default())),
                    })
                },
            )
            .optional()?;
        Ok(r)
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    // -----------------------------------------------------------------------
    // Favorites
    // -----------------------------------------------------------------------

    pub fn add_favorite(&self, user_id: &str, item_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO favorites (user_id, item_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, item_id, now_millis()],
        )?;
        Ok(())
    }

    pub fn remove_favorite(&self, user_id: &str, item_id: i64) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM favorites WHERE user_id = ?1 AND item_id = ?2",
            params![user_id, item_id],
        )?;
        Ok(n > 0)
    }

    /// Favorited items, newest favorite first.
    pub fn list_favorites(&self, user_id: &str) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM favorites
             JOIN items ON items.id = favorites.item_id
             WHERE favorites.user_id = ?1
             ORDER BY favorites.created_at DESC, favorites.rowid DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], item_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // PDF reading state
    // -----------------------------------------------------------------------

    pub fn get_pdf_position(&self, user_id: &str, item_id: i64) -> Result<Option<i64>> {
        let r = self
            .conn
            .query_row(
                "SELECT page FROM pdf_positions WHERE user_id = ?1 AND item_id = ?2",
                params![user_id, item_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(r)
    }

    pub fn set_pdf_position(&self, user_id: &str, item_id: i64, page: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO pdf_positions (user_id, item_id, page, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, item_id) DO UPDATE SET page = excluded.page,
                                                         updated_at = excluded.updated_at",
            params![user_id, item_id, page, now_millis()],
        )?;
        Ok(())
    }

    pub fn list_pdf_bookmarks(&self, user_id: &str, item_id: i64) -> Result<Vec<PdfBookmark>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, page, note, created_at FROM pdf_bookmarks
             WHERE user_id = ?1 AND item_id = ?2
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![user_id, item_id], |row| {
            Ok(PdfBookmark {
                id: row.get(0)?,
                page: row.get(1)?,
                note: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn add_pdf_bookmark(
        &self,
        user_id: &str,
        item_id: i64,
        page: i64,
        note: Option<&str>,
    ) -> Result<PdfBookmark> {
        let created_at = now_millis();
        self.conn.execute(
            "INSERT INTO pdf_bookmarks (user_id, item_id, page, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, item_id, page, note, created_at],
        )?;
        Ok(PdfBookmark {
            id: self.conn.last_insert_rowid(),
            page,
            note: note.map(str::to_string),
            created_at,
        })
    }

    /// Only deletes bookmarks owned by `user_id`.
    pub fn delete_pdf_bookmark(&self, user_id: &str, bookmark_id: i64) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM pdf_bookmarks WHERE id = ?1 AND user_id = ?2",
            params![bookmark_id, user_id],
        )?;
        Ok(n > 0)
    }

    // -----------------------------------------------------------------------
    // SGF reading state
    // -----------------------------------------------------------------------

    pub fn get_sgf_position(&self, user_id: &str, item_id: i64) -> Result<Option<i64>> {
        let r = self
            .conn
            .query_row(
                "SELECT node_index FROM sgf_positions WHERE user_id = ?1 AND item_id = ?2",
                params![user_id, item_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(r)
    }

    pub fn set_sgf_position(&self, user_id: &str, item_id: i64, node_index: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sgf_positions (user_id, item_id, node_index, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, item_id) DO UPDATE SET node_index = excluded.node_index,
                                                         updated_at = excluded.updated_at",
            params![user_id, item_id, node_index, now_millis()],
        )?;
        Ok(())
    }

    pub fn list_sgf_node_favorites(&self, user_id: &str, item_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT node_index FROM sgf_node_favorites
             WHERE user_id = ?1 AND item_id = ?2
             ORDER BY node_index ASC",
        )?;
        let rows = stmt.query_map(params![user_id, item_id], |row| row.get(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn add_sgf_node_favorite(&self, user_id: &str, item_id: i64, node_index: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO sgf_node_favorites (user_id, item_id, node_index, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, item_id, node_index, now_millis()],
        )?;
        Ok(())
    }

    pub fn remove_sgf_node_favorite(
        &self,
        user_id: &str,
        item_id: i64,
        node_index: i64,
    ) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM sgf_node_favorites WHERE user_id = ?1 AND item_id = ?2 AND node_index = ?3",
            params![user_id, item_id, node_index],
        )?;
        Ok(n > 0)
    }

    // -----------------------------------------------------------------------
    // Recents
    // -----------------------------------------------------------------------

    pub fn add_recent(&self, user_id: &str, item_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO recents (user_id, item_id, ts) VALUES (?1, ?2, ?3)",
            params![user_id, item_id, now_millis()],
        )?;
        Ok(())
    }

    /// Most recent first. Every open is its own entry.
    pub fn list_recents(&self, user_id: &str, limit: i64) -> Result<Vec<RecentEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT recents.item_id, recents.ts, items.title, items.type FROM recents
             JOIN items ON items.id = recents.item_id
             WHERE recents.user_id = ?1
             ORDER BY recents.ts DESC, recents.id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok(RecentEntry {
                item_id: row.get(0)?,
                ts: row.get(1)?,
                title: row.get(2)?,
                item_type: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}
