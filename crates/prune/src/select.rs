//! Kept/removed decisions over decomposed chunks (§4.8.3).

use once_cell::sync::Lazy;
use pagemap_domain::model::{ChunkType, HtmlChunk, PruneReason, SchemaName};
use regex::Regex;

static HIGH_VALUE_SHORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)in stock|out of stock|ships in|free shipping|only \d+ left|limited stock|\d+% off|save \$?\d+|sale|discount|재고|무료배송|품절|送料無料|在庫").unwrap()
});

static NOISE_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s\-–—]*$|^n/?a$|^\d+$").unwrap());

/// Schema-specific positive-match class/itemprop signatures (§4.8.3 #2).
fn schema_match(chunk: &HtmlChunk, schema: SchemaName) -> bool {
    let class = chunk.attrs.get("class").map(String::as_str).unwrap_or("");
    let itemprop = chunk.attrs.get("itemprop").map(String::as_str).unwrap_or("");
    match schema {
        SchemaName::Product => {
            matches!(itemprop, "name" | "price" | "offers" | "sku" | "brand")
                || class.contains("a-price")
                || class.contains("a-offscreen")
                || class.contains("ProductUnit_productName")
                || class.contains("product-card-info")
                || class.contains("goods_name")
        }
        SchemaName::NewsArticle => itemprop == "headline" || chunk.tag == "time",
        SchemaName::WikiArticle => class.contains("infobox") || chunk.tag == "table",
        SchemaName::SaaSPage => class.contains("pricing") || class.contains("feature-"),
        SchemaName::GovernmentPage => class.contains("contact") || itemprop == "telephone",
        _ => false,
    }
}

/// Decide keep/remove for every chunk. `has_main` disables the
/// fallback "no-main" keep rules when `true`.
pub fn prune_chunks(chunks: Vec<HtmlChunk>, schema: SchemaName, has_main: bool) -> Vec<(HtmlChunk, Option<PruneReason>)> {
    let deduped = remove_noisy_table_rows(chunks);

    deduped
        .into_iter()
        .map(|chunk| {
            let reason = decide(&chunk, schema, has_main);
            (chunk, reason)
        })
        .collect()
}

fn decide(chunk: &HtmlChunk, schema: SchemaName, has_main: bool) -> Option<PruneReason> {
    if chunk.chunk_type == ChunkType::Meta {
        return Some(PruneReason::MetaAlwaysKeep);
    }

    if schema_match(chunk, schema) {
        return Some(PruneReason::SchemaMatch);
    }

    if chunk.in_main {
        return Some(match chunk.chunk_type {
            ChunkType::Heading => PruneReason::InMainHeading,
            ChunkType::Form => PruneReason::InMainForm,
            ChunkType::Media => PruneReason::InMainMedia,
            ChunkType::Table | ChunkType::List | ChunkType::RscData => PruneReason::InMainStructured,
            ChunkType::TextBlock => {
                if chunk.text.len() <= 120 && HIGH_VALUE_SHORT.is_match(&chunk.text) {
                    PruneReason::InMainHighValueShort
                } else if chunk.text.len() < 20 {
                    PruneReason::InMainShort
                } else {
                    PruneReason::InMainText
                }
            }
            ChunkType::Meta => unreachable!(),
        });
    }

    if !has_main {
        return match chunk.chunk_type {
            ChunkType::Heading => Some(PruneReason::KeepHeadingNoMain),
            ChunkType::Form => Some(PruneReason::KeepFormNoMain),
            ChunkType::Media => Some(PruneReason::KeepMediaNoMain),
            ChunkType::TextBlock if chunk.text.len() >= 50 => Some(PruneReason::KeepTextNoMain),
            _ => None,
        };
    }

    None
}

/// Remove table rows that carry no information: unnamed row whose every
/// cell is whitespace, a bare number, a dash, "N/A", or an em-dash.
fn remove_noisy_table_rows(chunks: Vec<HtmlChunk>) -> Vec<HtmlChunk> {
    chunks
        .into_iter()
        .filter(|c| {
            if c.chunk_type != ChunkType::Table {
                return true;
            }
            // A table chunk with only noise-cell text carries no content
            // worth keeping; a populated table (header row, real values)
            // survives untouched.
            !(c.text.len() < 40 && NOISE_CELL.is_match(c.text.trim()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn chunk(tag: &str, chunk_type: ChunkType, text: &str, in_main: bool) -> HtmlChunk {
        HtmlChunk {
            xpath: "/div[1]".into(),
            html: format!("<{tag}>{text}</{tag}>"),
            text: text.to_string(),
            tag: tag.to_string(),
            chunk_type,
            attrs: HashMap::new(),
            parent_xpath: String::new(),
            depth: 1,
            in_main,
        }
    }

    #[test]
    fn meta_is_always_kept() {
        let c = chunk("meta", ChunkType::Meta, "", false);
        assert_eq!(decide(&c, SchemaName::Generic, true), Some(PruneReason::MetaAlwaysKeep));
    }

    #[test]
    fn in_main_text_block_is_kept() {
        let c = chunk("p", ChunkType::TextBlock, "a reasonably long paragraph of body text", true);
        assert_eq!(decide(&c, SchemaName::Generic, true), Some(PruneReason::InMainText));
    }

    #[test]
    fn high_value_short_text_detected_in_main() {
        let c = chunk("span", ChunkType::TextBlock, "Only 3 left in stock", true);
        assert_eq!(decide(&c, SchemaName::Generic, true), Some(PruneReason::InMainHighValueShort));
    }

    #[test]
    fn outside_main_with_main_present_is_dropped() {
        let c = chunk("p", ChunkType::TextBlock, "random sidebar text of no importance at all", false);
        assert_eq!(decide(&c, SchemaName::Generic, true), None);
    }

    #[test]
    fn no_main_fallback_keeps_long_text_blocks() {
        let c = chunk("p", ChunkType::TextBlock, "a paragraph that is at least fifty characters long for sure", false);
        assert_eq!(decide(&c, SchemaName::Generic, false), Some(PruneReason::KeepTextNoMain));
    }

    #[test]
    fn product_schema_match_wins_over_default() {
        let mut c = chunk("span", ChunkType::TextBlock, "$19.99", false);
        c.attrs.insert("itemprop".into(), "price".into());
        assert_eq!(decide(&c, SchemaName::Product, true), Some(PruneReason::SchemaMatch));
    }

    #[test]
    fn noisy_table_rows_are_removed() {
        let chunks = vec![
            chunk("table", ChunkType::Table, "N/A", false),
            chunk("table", ChunkType::Table, "Quarterly revenue rose substantially", false),
        ];
        let kept = remove_noisy_table_rows(chunks);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "Quarterly revenue rose substantially");
    }
}
