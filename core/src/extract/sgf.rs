use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde_json::{Map, Value};

use super::{ExtractedMeta, Extractor, ItemType};

/// Game-info properties copied into an item's `meta`.
pub const META_PROPS: [&str; 5] = ["PB", "PW", "KM", "DT", "EV"];

pub const DEFAULT_BOARD_SIZE: usize = 19;
const MAX_BOARD_SIZE: usize = 25;

static PROP_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    META_PROPS
        .iter()
        .map(|prop| {
            let re = Regex::new(&format!(r"\b{prop}\[((?:\\.|[^\]\\])*)\]")).expect("valid regex");
            (*prop, re)
        })
        .collect()
});
static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bSZ\[(\d+)\]").expect("valid regex"));
static MOVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";\s*(B|W)\[([^\]]*)\]").expect("valid regex"));
static SETUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bA(B|W)((?:\s*\[[^\]]*\])+)").expect("valid regex"));
static VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]").expect("valid regex"));

pub struct SgfExtractor;

impl Extractor for SgfExtractor {
    fn item_type(&self) -> ItemType {
        ItemType::Sgf
    }

    fn file_extensions(&self) -> &[&str] {
        &["sgf"]
    }

    fn extract(&self, source: &[u8]) -> Result<ExtractedMeta> {
        let text = String::from_utf8_lossy(source);
        let meta = game_info(&text);

        let title = match meta.get("EV").and_then(Value::as_str) {
            Some(ev) if !ev.is_empty() => ev.to_string(),
            _ => {
                let black = meta.get("PB").and_then(Value::as_str).unwrap_or("Black");
                let white = meta.get("PW").and_then(Value::as_str).unwrap_or("White");
                format!("{black} vs {white}")
            }
        };

        Ok(ExtractedMeta {
            title: Some(title),
            pages: None,
            meta: Some(meta),
        })
    }
}

/// First occurrence of each game-info property, with SGF escapes removed.
pub fn game_info(text: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    for (prop, re) in PROP_RES.iter() {
        if let Some(value) = re.captures(text).and_then(|c| c.get(1)) {
            meta.insert(prop.to_string(), Value::String(unescape(value.as_str())));
        }
    }
    meta
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Game records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stone {
    Black,
    White,
}

impl Stone {
    pub fn opponent(self) -> Self {
        match self {
            Stone::Black => Stone::White,
            Stone::White => Stone::Black,
        }
    }
}

/// Board coordinate, column then row, zero-based from the top-left.
pub type Point = (usize, usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub color: Stone,
    /// `None` for a pass.
    pub point: Option<Point>,
}

/// The parts of a game record needed to draw its final position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgfGame {
    pub size: usize,
    pub setup_black: Vec<Point>,
    pub setup_white: Vec<Point>,
    pub moves: Vec<Move>,
}

/// Pull board size, setup stones and moves out of an SGF text. Variations are
/// not followed; moves are taken in document order.
pub fn parse_game(text: &str) -> SgfGame {
    let size = SIZE_RE
        .captures(text)
        .and_then(|c| c[1].parse::<usize>().ok())
        .unwrap_or(DEFAULT_BOARD_SIZE)
        .clamp(2, MAX_BOARD_SIZE);

    let mut setup_black = Vec::new();
    let mut setup_white = Vec::new();
    for caps in SETUP_RE.captures_iter(text) {
        let target = if &caps[1] == "B" {
            &mut setup_black
        } else {
            &mut setup_white
        };
        for value in VALUE_RE.captures_iter(&caps[2]) {
            target.extend(expand_point_list(&value[1], size));
        }
    }

    let moves = MOVE_RE
        .captures_iter(text)
        .map(|caps| Move {
            color: if &caps[1] == "B" { Stone::Black } else { Stone::White },
            point: parse_point(&caps[2], size),
        })
        .collect();

    SgfGame {
        size,
        setup_black,
        setup_white,
        moves,
    }
}

/// `aa` is the top-left corner. Empty values, `tt` and anything off the
/// board read as no point.
pub fn parse_point(value: &str, size: usize) -> Option<Point> {
    let bytes = value.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let x = bytes[0].checked_sub(b'a')? as usize;
    let y = bytes[1].checked_sub(b'a')? as usize;
    if x >= size || y >= size {
        return None;
    }
    Some((x, y))
}

/// Setup values may use the compressed `aa:cc` rectangle form.
fn expand_point_list(value: &str, size: usize) -> Vec<Point> {
    match value.split_once(':') {
        Some((from, to)) => {
            let (Some(a), Some(b)) = (parse_point(from, size), parse_point(to, size)) else {
                return Vec::new();
            };
            let (x0, x1) = (a.0.min(b.0), a.0.max(b.0));
            let (y0, y1) = (a.1.min(b.1), a.1.max(b.1));
            (y0..=y1)
                .flat_map(|y| (x0..=x1).map(move |x| (x, y)))
                .collect()
        }
        None => parse_point(value, size).into_iter().collect(),
    }
}
