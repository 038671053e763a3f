use serde_json::json;
use shelf_core::db::{Database, ItemQuery, ItemSort, NewItem, ThumbnailRecord};
use shelf_core::extract::ItemType;
use shelf_core::thumbs::Variant;

/// Helper: in-memory DB with users A and B.
fn setup() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.sync_users(&[
        ("A".to_string(), "Alice".to_string()),
        ("B".to_string(), "Bob".to_string()),
    ])
    .unwrap();
    db
}

fn new_item(path: &str, item_type: ItemType, title: &str) -> NewItem {
    let folder = path.rsplit_once('/').map(|(f, _)| f.to_string()).unwrap_or_default();
    NewItem {
        item_type,
        path: path.to_string(),
        title: title.to_string(),
        folder,
        size: 100,
        mtime: 1_000,
        pages: None,
        meta: None,
    }
}

// ---------------------------------------------------------------------------
// 1. Schema migration: all tables exist after open
// ---------------------------------------------------------------------------
#[test]
fn test_create_database_and_migrate() {
    let db = Database::open_in_memory().unwrap();
    let tables = db.table_names().unwrap();

    let expected = [
        "favorites",
        "items",
        "migrations",
        "pdf_bookmarks",
        "pdf_positions",
        "recents",
        "sgf_node_favorites",
        "sgf_positions",
        "thumbnails",
        "users",
    ];
    for t in &expected {
        assert!(
            tables.iter().any(|name| name == t),
            "missing table: {t}, got: {tables:?}"
        );
    }

    assert_eq!(
        db.applied_migrations().unwrap(),
        vec!["001_library.sql".to_string(), "002_users.sql".to_string()]
    );
}

// ---------------------------------------------------------------------------
// 2. Migrations are applied once per database file
// ---------------------------------------------------------------------------
#[test]
fn test_reopen_does_not_reapply_migrations() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("library.db");
    let path = path.to_string_lossy().to_string();

    {
        let db = Database::open(&path).unwrap();
        db.upsert_item(&new_item("a.pdf", ItemType::Pdf, "A"), 10).unwrap();
    }
    let db = Database::open(&path).unwrap();
    assert_eq!(db.applied_migrations().unwrap().len(), 2);
    assert_eq!(db.item_count().unwrap(), 1);
}

// ---------------------------------------------------------------------------
// 3. Item upsert keeps id and created_at, bumps updated_at only on change
// ---------------------------------------------------------------------------
#[test]
fn test_upsert_item_by_path() {
    let db = setup();
    let mut item = new_item("books/go.pdf", ItemType::Pdf, "Go Proverbs");
    item.pages = Some(12);
    item.meta = Some(json!({"source": "scan"}));

    let id1 = db.upsert_item(&item, 100).unwrap();
    let stored = db.get_item(id1).unwrap().unwrap();
    assert_eq!(stored.title, "Go Proverbs");
    assert_eq!(stored.folder, "books");
    assert_eq!(stored.pages, Some(12));
    assert_eq!(stored.meta, Some(json!({"source": "scan"})));
    assert_eq!(stored.created_at, 100);
    assert_eq!(stored.updated_at, 100);

    // Unchanged file: same id, timestamps untouched.
    let id2 = db.upsert_item(&item, 200).unwrap();
    assert_eq!(id1, id2);
    let stored = db.get_item(id1).unwrap().unwrap();
    assert_eq!(stored.updated_at, 100);

    // Changed mtime: updated_at moves, created_at stays.
    item.mtime = 2_000;
    db.upsert_item(&item, 300).unwrap();
    let stored = db.get_item_by_path("books/go.pdf").unwrap().unwrap();
    assert_eq!(stored.id, id1);
    assert_eq!(stored.created_at, 100);
    assert_eq!(stored.updated_at, 300);
    assert_eq!(stored.mtime, 2_000);

    assert_eq!(db.item_count().unwrap(), 1);
}

// ---------------------------------------------------------------------------
// 4. Deleting an item cascades to thumbnails and per-user rows
// ---------------------------------------------------------------------------
#[test]
fn test_delete_item_cascades() {
    let db = setup();
    let id = db
        .upsert_item(&new_item("a.sgf", ItemType::Sgf, "Game"), 1)
        .unwrap();

    db.upsert_thumbnail(&ThumbnailRecord {
        item_id: id,
        variant: Variant::Grid,
        path: "/tmp/1-grid.png".to_string(),
        width: 260,
        height: 260,
        updated_at: 1,
    })
    .unwrap();
    db.add_favorite("A", id).unwrap();
    db.set_sgf_position("A", id, 12).unwrap();
    db.add_sgf_node_favorite("A", id, 3).unwrap();
    db.add_recent("A", id).unwrap();

    assert!(db.delete_item(id).unwrap());
    assert!(!db.delete_item(id).unwrap());

    assert!(db.get_thumbnail(id, Variant::Grid).unwrap().is_none());
    assert!(db.list_favorites("A").unwrap().is_empty());
    assert_eq!(db.get_sgf_position("A", id).unwrap(), None);
    assert!(db.list_sgf_node_favorites("A", id).unwrap().is_empty());
    assert!(db.list_recents("A", 10).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// 5. Deleted ids are never handed out again
// ---------------------------------------------------------------------------
#[test]
fn test_item_ids_not_reused() {
    let db = setup();
    let first = db.upsert_item(&new_item("a.pdf", ItemType::Pdf, "A"), 1).unwrap();
    db.delete_item(first).unwrap();
    let second = db.upsert_item(&new_item("b.pdf", ItemType::Pdf, "B"), 2).unwrap();
    assert!(second > first);
}

// ---------------------------------------------------------------------------
// 6. Listing: filters, sorting, paging, grid thumbnail flag
// ---------------------------------------------------------------------------
#[test]
fn test_list_items_filters_and_sorts() {
    let db = setup();
    let a = db
        .upsert_item(&new_item("go/beta.sgf", ItemType::Sgf, "beta game"), 10)
        .unwrap();
    let b = db
        .upsert_item(&new_item("go/Alpha.pdf", ItemType::Pdf, "Alpha book"), 20)
        .unwrap();
    let c = db
        .upsert_item(&new_item("web/page.html", ItemType::Html, "Gamma page"), 30)
        .unwrap();

    // Default: updated_at desc.
    let all = db.list_items(&ItemQuery::default()).unwrap();
    let ids: Vec<i64> = all.iter().map(|l| l.item.id).collect();
    assert_eq!(ids, vec![c, b, a]);

    // Title sort is case-insensitive ascending.
    let by_title = db
        .list_items(&ItemQuery {
            sort: ItemSort::Title,
            ..Default::default()
        })
        .unwrap();
    let titles: Vec<&str> = by_title.iter().map(|l| l.item.title.as_str()).collect();
    assert_eq!(titles, vec!["Alpha book", "beta game", "Gamma page"]);

    // Type and folder filters.
    let sgf = db
        .list_items(&ItemQuery {
            item_type: Some(ItemType::Sgf),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(sgf.len(), 1);
    assert_eq!(sgf[0].item.id, a);

    let go = db
        .list_items(&ItemQuery {
            folder: Some("go".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(go.len(), 2);

    // Search matches title or path.
    let found = db
        .list_items(&ItemQuery {
            search: Some("page".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].item.id, c);

    // Paging.
    let page2 = db
        .list_items(&ItemQuery {
            page: 2,
            limit: 2,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page2.len(), 1);
    assert_eq!(page2[0].item.id, a);

    // Grid thumbnail flag.
    assert!(all.iter().all(|l| !l.has_grid_thumb));
    db.upsert_thumbnail(&ThumbnailRecord {
        item_id: b,
        variant: Variant::Grid,
        path: "/tmp/b-grid.png".to_string(),
        width: 260,
        height: 338,
        updated_at: 1,
    })
    .unwrap();
    let all = db.list_items(&ItemQuery::default()).unwrap();
    let flagged: Vec<i64> = all.iter().filter(|l| l.has_grid_thumb).map(|l| l.item.id).collect();
    assert_eq!(flagged, vec![b]);
}

#[test]
fn test_search_matches_wildcards_literally() {
    let db = setup();
    let pct = db.upsert_item(&new_item("go/a.pdf", ItemType::Pdf, "100% Go"), 1).unwrap();
    db.upsert_item(&new_item("go/b.pdf", ItemType::Pdf, "1000 problems"), 2).unwrap();
    let under = db.upsert_item(&new_item("notes/a_b.html", ItemType::Html, "Notes"), 3).unwrap();
    db.upsert_item(&new_item("notes/axb.html", ItemType::Html, "More notes"), 4).unwrap();
    db.upsert_item(&new_item("win/c.pdf", ItemType::Pdf, "C:\\books"), 5).unwrap();

    let search = |term: &str| -> Vec<i64> {
        db.list_items(&ItemQuery {
            search: Some(term.to_string()),
            ..Default::default()
        })
        .unwrap()
        .iter()
        .map(|l| l.item.id)
        .collect()
    };

    assert_eq!(search("100%"), vec![pct]);
    assert_eq!(search("a_b"), vec![under]);
    assert_eq!(search("%"), vec![pct]);
    assert_eq!(search("\\books").len(), 1);
}

// ---------------------------------------------------------------------------
// 7. Favorites filter and last-opened ordering
// ---------------------------------------------------------------------------
#[test]
fn test_list_items_favorites_and_last_opened() {
    let db = setup();
    let a = db.upsert_item(&new_item("a.pdf", ItemType::Pdf, "A"), 10).unwrap();
    let b = db.upsert_item(&new_item("b.pdf", ItemType::Pdf, "B"), 20).unwrap();
    let c = db.upsert_item(&new_item("c.pdf", ItemType::Pdf, "C"), 30).unwrap();

    db.add_favorite("A", a).unwrap();
    db.add_favorite("A", a).unwrap();
    db.add_favorite("B", b).unwrap();

    let favs = db
        .list_items(&ItemQuery {
            favorites_of: Some("A".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(favs.len(), 1);
    assert_eq!(favs[0].item.id, a);

    db.add_recent("B", c).unwrap();
    db.add_recent("A", a).unwrap();

    // For user A only A's history counts: a first, then never-opened items by id desc.
    let opened = db
        .list_items(&ItemQuery {
            sort: ItemSort::LastOpened,
            user_id: Some("A".to_string()),
            ..Default::default()
        })
        .unwrap();
    let ids: Vec<i64> = opened.iter().map(|l| l.item.id).collect();
    assert_eq!(ids, vec![a, c, b]);
}

// ---------------------------------------------------------------------------
// 8. Thumbnail rows upsert per (item, variant)
// ---------------------------------------------------------------------------
#[test]
fn test_thumbnail_upsert() {
    let db = setup();
    let id = db.upsert_item(&new_item("a.pdf", ItemType::Pdf, "A"), 1).unwrap();

    let mut record = ThumbnailRecord {
        item_id: id,
        variant: Variant::Cover,
        path: "/tmp/x-cover.png".to_string(),
        width: 400,
        height: 520,
        updated_at: 1,
    };
    db.upsert_thumbnail(&record).unwrap();
    record.height = 566;
    record.updated_at = 2;
    db.upsert_thumbnail(&record).unwrap();

    let stored = db.get_thumbnail(id, Variant::Cover).unwrap().unwrap();
    assert_eq!(stored, record);
    assert!(db.get_thumbnail(id, Variant::Grid).unwrap().is_none());
}

#[test]
fn test_thumbnail_upsert_for_deleted_item_is_skipped() {
    let db = setup();
    let id = db.upsert_item(&new_item("a.pdf", ItemType::Pdf, "A"), 1).unwrap();
    let record = ThumbnailRecord {
        item_id: id,
        variant: Variant::Grid,
        path: "/tmp/x-grid.png".to_string(),
        width: 200,
        height: 260,
        updated_at: 1,
    };
    assert!(db.upsert_thumbnail(&record).unwrap());

    // A render that finishes after the item was removed writes nothing.
    assert!(db.delete_item(id).unwrap());
    assert!(!db.upsert_thumbnail(&record).unwrap());
    assert!(db.get_thumbnail(id, Variant::Grid).unwrap().is_none());
}

// ---------------------------------------------------------------------------
// 9. User sync keeps preferences, renames, and drops missing users
// ---------------------------------------------------------------------------
#[test]
fn test_sync_users() {
    let db = setup();
    assert!(db.user_exists("A").unwrap());
    assert_eq!(db.get_user("A").unwrap().unwrap().preferences, json!({}));

    db.sync_users(&[("A".to_string(), "Ann".to_string())]).unwrap();
    assert_eq!(db.get_user("A").unwrap().unwrap().name, "Ann");
    assert!(!db.user_exists("B").unwrap());

    db.sync_users(&[]).unwrap();
    assert!(!db.user_exists("A").unwrap());
}

// ---------------------------------------------------------------------------
// 10. Reading positions upsert; bookmarks are per user
// ---------------------------------------------------------------------------
#[test]
fn test_positions_and_bookmarks() {
    let db = setup();
    let id = db.upsert_item(&new_item("a.pdf", ItemType::Pdf, "A"), 1).unwrap();

    assert_eq!(db.get_pdf_position("A", id).unwrap(), None);
    db.set_pdf_position("A", id, 4).unwrap();
    db.set_pdf_position("A", id, 9).unwrap();
    assert_eq!(db.get_pdf_position("A", id).unwrap(), Some(9));
    assert_eq!(db.get_pdf_position("B", id).unwrap(), None);

    let first = db.add_pdf_bookmark("A", id, 3, Some("intro")).unwrap();
    let second = db.add_pdf_bookmark("A", id, 7, None).unwrap();
    let list = db.list_pdf_bookmarks("A", id).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, second.id);
    assert_eq!(list[1].note.as_deref(), Some("intro"));

    // B cannot delete A's bookmark.
    assert!(!db.delete_pdf_bookmark("B", first.id).unwrap());
    assert!(db.delete_pdf_bookmark("A", first.id).unwrap());
    assert_eq!(db.list_pdf_bookmarks("A", id).unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// 11. SGF node favorites are idempotent and sorted
// ---------------------------------------------------------------------------
#[test]
fn test_sgf_node_favorites() {
    let db = setup();
    let id = db.upsert_item(&new_item("a.sgf", ItemType::Sgf, "A"), 1).unwrap();

    for n in [40, 5, 40, 17] {
        db.add_sgf_node_favorite("A", id, n).unwrap();
    }
    assert_eq!(db.list_sgf_node_favorites("A", id).unwrap(), vec![5, 17, 40]);
    assert!(db.remove_sgf_node_favorite("A", id, 17).unwrap());
    assert!(!db.remove_sgf_node_favorite("A", id, 17).unwrap());
    assert_eq!(db.list_sgf_node_favorites("A", id).unwrap(), vec![5, 40]);
}

// ---------------------------------------------------------------------------
// 12. Recents append and list newest first with item details
// ---------------------------------------------------------------------------
#[test]
fn test_recents() {
    let db = setup();
    let a = db.upsert_item(&new_item("a.pdf", ItemType::Pdf, "Book"), 1).unwrap();
    let b = db.upsert_item(&new_item("b.sgf", ItemType::Sgf, "Game"), 1).unwrap();

    db.add_recent("A", a).unwrap();
    db.add_recent("A", b).unwrap();
    db.add_recent("A", a).unwrap();

    let recents = db.list_recents("A", 50).unwrap();
    let ids: Vec<i64> = recents.iter().map(|r| r.item_id).collect();
    assert_eq!(ids, vec![a, b, a]);
    assert_eq!(recents[1].title, "Game");
    assert_eq!(recents[1].item_type, ItemType::Sgf);

    assert_eq!(db.list_recents("A", 2).unwrap().len(), 2);
    assert!(db.list_recents("B", 50).unwrap().is_empty());
}
