use std::sync::LazyLock;

use anyhow::Result;
use regex::bytes::Regex;

use super::{ExtractedMeta, Extractor, ItemType};

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)/Title \(([^)]+)\)").expect("valid regex"));
static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Count (\d+)").expect("valid regex"));

pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn item_type(&self) -> ItemType {
        ItemType::Pdf
    }

    fn file_extensions(&self) -> &[&str] {
        &["pdf"]
    }

    /// Scans the raw bytes for the first `/Title (...)` literal and the first
    /// `/Count N` entry. Compressed object streams hide both; callers fall
    /// back to the file name.
    fn extract(&self, source: &[u8]) -> Result<ExtractedMeta> {
        let title = TITLE_RE
            .captures(source)
            .and_then(|c| c.get(1))
            .map(|m| decode_text_string(m.as_bytes()))
            .filter(|t| !t.is_empty());

        let pages = COUNT_RE
            .captures(source)
            .and_then(|c| c.get(1))
            .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
            .and_then(|s| s.parse::<i64>().ok());

        Ok(ExtractedMeta {
            title,
            pages,
            meta: None,
        })
    }
}

/// PDF text strings are either PDFDocEncoding (close enough to Latin-1 for
/// titles) or UTF-16BE with a byte-order mark.
fn decode_text_string(raw: &[u8]) -> String {
    if let Some(utf16) = raw.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units).trim().to_string();
    }
    match std::str::from_utf8(raw) {
        Ok(s) => s.trim().to_string(),
        Err(_) => raw.iter().map(|&b| b as char).collect::<String>().trim().to_string(),
    }
}
