//! Chunk decomposition: walks the AOM-filtered DOM into the flat
//! `HtmlChunk` list the kept/removed pass and compressor operate on.

use std::collections::HashMap;

use pagemap_domain::model::{ChunkType, HtmlChunk};
use scraper::{ElementRef, Html, Selector};

const KEPT_ATTRS: &[&str] = &[
    "itemprop", "itemtype", "itemscope", "role", "aria-label", "aria-labelledby", "href", "src", "alt", "title",
    "datetime", "content", "property", "type", "name", "value",
];

const CHUNK_TAGS: &[&str] = &[
    "table", "ul", "ol", "p", "h1", "h2", "h3", "h4", "h5", "h6", "img", "picture", "video", "figure", "form",
    "time", "section", "article", "div", "script",
];

fn classify(tag: &str, attrs: &HashMap<String, String>) -> ChunkType {
    match tag {
        "table" => ChunkType::Table,
        "ul" | "ol" => ChunkType::List,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => ChunkType::Heading,
        "img" | "picture" | "video" | "figure" => ChunkType::Media,
        "form" => ChunkType::Form,
        "meta" | "link" => ChunkType::Meta,
        "script" if attrs.get("type").map(|t| t.contains("json")).unwrap_or(false) => ChunkType::RscData,
        _ => ChunkType::TextBlock,
    }
}

/// Decompose `html` (already AOM-filtered) into the flat chunk list used
/// by `prune_chunks`. `has_main` is reported alongside for the caller.
pub fn decompose(html: &str) -> (Vec<HtmlChunk>, bool) {
    let document = Html::parse_fragment(html);
    let selector = Selector::parse(&CHUNK_TAGS.join(",")).unwrap();
    let has_main = document.select(&Selector::parse("main,[role=main]").unwrap()).next().is_some();

    let mut chunks = Vec::new();
    for element in document.select(&selector) {
        // Skip nodes nested inside another chunk of the same decomposition
        // pass (e.g. a `<p>` inside a `<table>` cell isn't its own chunk);
        // only the closest matching ancestor produces a chunk.
        if element.ancestors().filter_map(ElementRef::wrap).any(|a| a.id() != element.id() && CHUNK_TAGS.contains(&a.value().name())) {
            continue;
        }

        let tag = element.value().name().to_string();
        let attrs: HashMap<String, String> = element
            .value()
            .attrs()
            .filter(|(k, _)| KEPT_ATTRS.contains(k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let xpath = xpath_for(&element);
        let parent_xpath = element
            .parent()
            .and_then(ElementRef::wrap)
            .map(|p| xpath_for(&p))
            .unwrap_or_default();
        let depth = element.ancestors().count() as u32;
        let in_main = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| a.value().name() == "main" || a.value().attr("role") == Some("main"))
            || tag == "main";

        chunks.push(HtmlChunk {
            xpath,
            html: element.html(),
            text: element.text().collect::<Vec<_>>().join(" ").trim().to_string(),
            tag: tag.clone(),
            chunk_type: classify(&tag, &attrs),
            attrs,
            parent_xpath,
            depth,
            in_main,
        });
    }

    (chunks, has_main)
}

/// Build a crude but stable XPath for `element` by counting same-tag
/// preceding siblings at each ancestor level.
fn xpath_for(element: &ElementRef) -> String {
    let mut segments = Vec::new();
    let mut current = Some(*element);
    while let Some(el) = current {
        let tag = el.value().name();
        let index = el
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|s| s.value().name() == tag)
            .count()
            + 1;
        segments.push(format!("{tag}[{index}]"));
        current = el.parent().and_then(ElementRef::wrap);
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

/// Parses the trailing `[N]` bracket index of each XPath segment as an
/// integer (not lexicographically) so `div[10]` sorts after `div[2]`.
pub fn xpath_sort_key(xpath: &str) -> Vec<(String, u32)> {
    xpath
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|seg| {
            if let Some(open) = seg.find('[') {
                let tag = seg[..open].to_string();
                let idx: u32 = seg[open + 1..seg.len() - 1].parse().unwrap_or(0);
                (tag, idx)
            } else {
                (seg.to_string(), 0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposes_headings_and_paragraphs_into_chunks() {
        let html = "<main><h1>Title</h1><p>Body text here</p></main>";
        let (chunks, has_main) = decompose(html);
        assert!(has_main);
        assert!(chunks.iter().any(|c| c.chunk_type == ChunkType::Heading));
        assert!(chunks.iter().any(|c| c.chunk_type == ChunkType::TextBlock && c.text == "Body text here"));
        assert!(chunks.iter().all(|c| c.in_main));
    }

    #[test]
    fn nested_paragraph_inside_table_is_not_double_chunked() {
        let html = "<table><tr><td><p>cell text</p></td></tr></table>";
        let (chunks, _) = decompose(html);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Table);
    }

    #[test]
    fn kept_attrs_are_retained_others_dropped() {
        let html = r#"<p class="noise" itemprop="description" data-x="1">hi</p>"#;
        let (chunks, _) = decompose(html);
        assert_eq!(chunks[0].attrs.get("itemprop").map(String::as_str), Some("description"));
        assert!(!chunks[0].attrs.contains_key("class"));
        assert!(!chunks[0].attrs.contains_key("data-x"));
    }

    #[test]
    fn xpath_sort_key_orders_numerically_not_lexically() {
        let mut paths = vec!["/div[2]", "/div[10]", "/div[1]"];
        paths.sort_by_key(|p| xpath_sort_key(p));
        assert_eq!(paths, vec!["/div[1]", "/div[2]", "/div[10]"]);
    }
}
