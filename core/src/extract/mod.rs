pub mod html;
pub mod pdf;
pub mod sgf;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Item types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Pdf,
    Sgf,
    Html,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Pdf => "pdf",
            ItemType::Sgf => "sgf",
            ItemType::Html => "html",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pdf" => Ok(ItemType::Pdf),
            "sgf" => Ok(ItemType::Sgf),
            "html" => Ok(ItemType::Html),
            other => anyhow::bail!("unknown item type: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Extracted data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedMeta {
    pub title: Option<String>,
    pub pages: Option<i64>,
    /// Format-specific fields, stored as a JSON object.
    pub meta: Option<Map<String, Value>>,
}

// ---------------------------------------------------------------------------
// Extractor trait
// ---------------------------------------------------------------------------

pub trait Extractor: Send + Sync {
    fn item_type(&self) -> ItemType;
    fn file_extensions(&self) -> &[&str];
    fn extract(&self, source: &[u8]) -> Result<ExtractedMeta>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            extractors: Vec::new(),
        };
        registry.register(Box::new(pdf::PdfExtractor));
        registry.register(Box::new(sgf::SgfExtractor));
        registry.register(Box::new(html::HtmlExtractor));
        registry
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    /// Look up the extractor for a file extension (without the dot, any case).
    pub fn for_extension(&self, ext: &str) -> Option<&dyn Extractor> {
        let ext = ext.to_ascii_lowercase();
        self.extractors
            .iter()
            .find(|e| e.file_extensions().contains(&ext.as_str()))
            .map(|e| e.as_ref())
    }

    pub fn for_path(&self, path: &Path) -> Option<&dyn Extractor> {
        let ext = path.extension()?.to_str()?;
        self.for_extension(ext)
    }

    pub fn detect_type(&self, path: &Path) -> Option<ItemType> {
        self.for_path(path).map(|e| e.item_type())
    }
}
