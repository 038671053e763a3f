use std::path::Path;

use serde_json::json;
use shelf_core::extract::sgf::{game_info, parse_game, parse_point, Move, Stone};
use shelf_core::extract::{ExtractorRegistry, ItemType};

fn extract(ext: &str, source: &[u8]) -> shelf_core::extract::ExtractedMeta {
    let registry = ExtractorRegistry::new();
    registry
        .for_extension(ext)
        .expect("extractor registered")
        .extract(source)
        .unwrap()
}

// ---------------------------------------------------------------------------
// 1. Registry resolves extensions case-insensitively
// ---------------------------------------------------------------------------
#[test]
fn test_registry_detects_types() {
    let registry = ExtractorRegistry::new();
    assert_eq!(registry.detect_type(Path::new("a/b.pdf")), Some(ItemType::Pdf));
    assert_eq!(registry.detect_type(Path::new("GAME.SGF")), Some(ItemType::Sgf));
    assert_eq!(registry.detect_type(Path::new("index.Html")), Some(ItemType::Html));
    assert_eq!(registry.detect_type(Path::new("notes.txt")), None);
    assert_eq!(registry.detect_type(Path::new("page.htm")), None);
    assert_eq!(registry.detect_type(Path::new("README")), None);
}

#[test]
fn test_item_type_round_trips_through_str() {
    for t in [ItemType::Pdf, ItemType::Sgf, ItemType::Html] {
        assert_eq!(t.as_str().parse::<ItemType>().unwrap(), t);
    }
    assert!("epub".parse::<ItemType>().is_err());
    assert_eq!(serde_json::to_value(ItemType::Sgf).unwrap(), json!("sgf"));
}

// ---------------------------------------------------------------------------
// 2. PDF: first /Title literal and first /Count
// ---------------------------------------------------------------------------
#[test]
fn test_pdf_title_and_pages() {
    let source = b"%PDF-1.4\n1 0 obj << /Type /Pages /Count 42 /Kids [] >> endobj\n\
        2 0 obj << /Title (Invincible: The Games of Shusaku) /Author (John Power) >> endobj\n\
        3 0 obj << /Title (Second) /Count 7 >> endobj";
    let meta = extract("pdf", source);
    assert_eq!(meta.title.as_deref(), Some("Invincible: The Games of Shusaku"));
    assert_eq!(meta.pages, Some(42));
    assert!(meta.meta.is_none());
}

#[test]
fn test_pdf_without_info_has_no_title() {
    let meta = extract("pdf", b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\nstream\x00\x01\x02endstream");
    assert_eq!(meta.title, None);
    assert_eq!(meta.pages, None);
}

#[test]
fn test_pdf_utf16_and_latin1_titles() {
    let mut utf16 = b"<< /Title (".to_vec();
    utf16.extend_from_slice(&[0xFE, 0xFF, 0x00, b'G', 0x00, b'o']);
    utf16.extend_from_slice(b") >>");
    assert_eq!(extract("pdf", &utf16).title.as_deref(), Some("Go"));

    let latin1 = b"<< /Title (Caf\xe9) >>";
    assert_eq!(extract("pdf", latin1).title.as_deref(), Some("Caf\u{e9}"));
}

#[test]
fn test_pdf_blank_title_is_absent() {
    assert_eq!(extract("pdf", b"<< /Title (   ) >>").title, None);
}

// ---------------------------------------------------------------------------
// 3. SGF: game info and title rules
// ---------------------------------------------------------------------------
const GAME: &str = "(;GM[1]FF[4]SZ[19]PB[Honinbo Shusaku]PW[Gennan Inseki]KM[0]\
    DT[1846-09-11]EV[Ear-reddening game]RE[B+2];B[qd];W[dc];B[pq])";

#[test]
fn test_sgf_event_becomes_title() {
    let meta = extract("sgf", GAME.as_bytes());
    assert_eq!(meta.title.as_deref(), Some("Ear-reddening game"));
    assert_eq!(meta.pages, None);
    let info = meta.meta.unwrap();
    assert_eq!(info.get("PB"), Some(&json!("Honinbo Shusaku")));
    assert_eq!(info.get("PW"), Some(&json!("Gennan Inseki")));
    assert_eq!(info.get("KM"), Some(&json!("0")));
    assert_eq!(info.get("DT"), Some(&json!("1846-09-11")));
    assert!(info.get("RE").is_none(), "only game-info props are kept");
}

#[test]
fn test_sgf_players_title_with_fallbacks() {
    let meta = extract("sgf", b"(;GM[1]PB[Lee Sedol];B[pd])");
    assert_eq!(meta.title.as_deref(), Some("Lee Sedol vs White"));

    let meta = extract("sgf", b"(;GM[1];B[pd])");
    assert_eq!(meta.title.as_deref(), Some("Black vs White"));
    assert_eq!(meta.meta, Some(Default::default()));
}

#[test]
fn test_sgf_escaped_values() {
    let info = game_info(r"(;PB[Smith \] Jr.]PW[O\\Neil])");
    assert_eq!(info.get("PB"), Some(&json!("Smith ] Jr.")));
    assert_eq!(info.get("PW"), Some(&json!("O\\Neil")));
}

// ---------------------------------------------------------------------------
// 4. SGF game records
// ---------------------------------------------------------------------------
#[test]
fn test_parse_point() {
    assert_eq!(parse_point("aa", 19), Some((0, 0)));
    assert_eq!(parse_point("sc", 19), Some((18, 2)));
    assert_eq!(parse_point("", 19), None);
    assert_eq!(parse_point("tt", 19), None);
    assert_eq!(parse_point("jj", 9), None);
    assert_eq!(parse_point("A1", 19), None);
}

#[test]
fn test_parse_game_moves_and_setup() {
    let game = parse_game("(;SZ[9]AB[aa][cc:dd]AW[ee];B[ba];W[];B[tt];W[ab])");
    assert_eq!(game.size, 9);
    assert_eq!(game.setup_black, vec![(0, 0), (2, 2), (3, 2), (2, 3), (3, 3)]);
    assert_eq!(game.setup_white, vec![(4, 4)]);
    assert_eq!(
        game.moves,
        vec![
            Move { color: Stone::Black, point: Some((1, 0)) },
            Move { color: Stone::White, point: None },
            Move { color: Stone::Black, point: None },
            Move { color: Stone::White, point: Some((0, 1)) },
        ]
    );
}

#[test]
fn test_parse_game_board_size_defaults_and_clamps() {
    assert_eq!(parse_game("(;B[aa])").size, 19);
    assert_eq!(parse_game("(;SZ[13])").size, 13);
    assert_eq!(parse_game("(;SZ[52])").size, 25);
    assert_eq!(parse_game("(;SZ[1])").size, 2);
}

// ---------------------------------------------------------------------------
// 5. HTML: <title> contents
// ---------------------------------------------------------------------------
#[test]
fn test_html_title() {
    let meta = extract(
        "html",
        b"<!doctype html><HTML><head><TITLE lang=\"en\">\n  Tsumego &amp; Tesuji  \n</TITLE></head></HTML>",
    );
    assert_eq!(meta.title.as_deref(), Some("Tsumego & Tesuji"));
}

#[test]
fn test_html_without_title() {
    assert_eq!(extract("html", b"<html><body>hi</body></html>").title, None);
    assert_eq!(extract("html", b"<title>   </title>").title, None);
}
