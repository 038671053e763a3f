use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use super::{ExtractedMeta, Extractor, ItemType};

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>([^<]*)</title>").expect("valid regex"));

pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn item_type(&self) -> ItemType {
        ItemType::Html
    }

    fn file_extensions(&self) -> &[&str] {
        &["html"]
    }

    fn extract(&self, source: &[u8]) -> Result<ExtractedMeta> {
        let text = String::from_utf8_lossy(source);
        let title = TITLE_RE
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str().trim()))
            .filter(|t| !t.is_empty());
        Ok(ExtractedMeta {
            title,
            pages: None,
            meta: None,
        })
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
