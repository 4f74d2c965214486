//! Re-merge of kept chunks in document order, followed by lossless
//! compression (attribute stripping, empty-tag collapse, wrapper
//! unwrapping, whitespace normalization).

use once_cell::sync::Lazy;
use pagemap_domain::model::{HtmlChunk, PruneReason};
use regex::Regex;
use scraper::{Html, Node};

use crate::chunk::xpath_sort_key;

const KEPT_ATTRS: &[&str] = &[
    "itemprop", "itemtype", "itemscope", "role", "aria-label", "aria-labelledby", "href", "src", "alt", "title",
    "datetime", "content", "property", "type", "name", "value",
];

const EMPTY_TAG_CANDIDATES: &[&str] = &[
    "div", "span", "p", "section", "article", "aside", "figure", "figcaption", "details", "summary", "b", "i", "em",
    "strong", "small", "sup", "sub", "a", "abbr", "cite", "code", "mark", "u", "s",
];

const BLOCK_WRAPPER_TAGS: &[&str] = &["div", "section", "article", "aside", "figure"];

const MAX_EMPTY_TAG_PASSES: usize = 5;

// One pattern per tag rather than a single alternation with a `\1`
// backreference to the opening tag — the `regex` crate doesn't support
// backreferences, so each candidate gets its own compiled matcher.
static EMPTY_TAG_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    EMPTY_TAG_CANDIDATES
        .iter()
        .map(|tag| Regex::new(&format!(r"<{tag}(\s[^>]*)?>\s*</{tag}>")).unwrap())
        .collect()
});
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static ADJACENT_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s*<").unwrap());
static BARE_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<span(\s[^>]*)?>([^<]*)</span>").unwrap());

/// Sort kept chunks into document order (numeric XPath bracket indices)
/// and concatenate their HTML.
pub fn remerge(kept: Vec<(HtmlChunk, PruneReason)>) -> String {
    let mut kept = kept;
    kept.sort_by_key(|(c, _)| xpath_sort_key(&c.xpath));
    kept.into_iter().map(|(c, _)| c.html).collect::<Vec<_>>().join("\n")
}

/// Lossless compression pipeline over re-merged HTML: attribute
/// allowlisting and single-child block-wrapper collapsing happen together
/// in one DOM walk (`strip_and_unwrap`), then empty-tag collapse, bare
/// `<span>` unwrapping, and whitespace normalization run as text passes.
pub fn compress(html: &str) -> String {
    let mut out = strip_and_unwrap(html);
    out = unwrap_bare_spans(&out);

    for _ in 0..MAX_EMPTY_TAG_PASSES {
        let mut next = out.clone();
        for pattern in EMPTY_TAG_PATTERNS.iter() {
            next = pattern.replace_all(&next, "").to_string();
        }
        if next == out {
            break;
        }
        out = next;
    }

    out = WHITESPACE_RUN.replace_all(&out, " ").to_string();
    out = ADJACENT_TAGS.replace_all(&out, ">\n<").to_string();
    out.trim().to_string()
}

/// Single DOM pass that both drops every attribute outside `KEPT_ATTRS`
/// and collapses `<div><p>…</p></div>`-shaped single-child block wrappers
/// to their inner element.
fn strip_and_unwrap(html: &str) -> String {
    let document = Html::parse_fragment(html);
    let mut out = String::new();
    for node in document.root_element().children() {
        render(node, &mut out);
    }
    out
}

fn render(node: ego_tree::NodeRef<Node>, out: &mut String) {
    match node.value() {
        Node::Element(el) => {
            let children: Vec<_> = node.children().collect();
            let element_children: Vec<_> = children.iter().filter(|c| matches!(c.value(), Node::Element(_))).collect();
            let non_element_children_are_blank = children
                .iter()
                .filter(|c| !matches!(c.value(), Node::Element(_)))
                .all(|c| c.value().as_text().map(|t| t.trim().is_empty()).unwrap_or(true));

            if BLOCK_WRAPPER_TAGS.contains(&el.name()) && element_children.len() == 1 && non_element_children_are_blank {
                render(*element_children[0], out);
                return;
            }

            out.push('<');
            out.push_str(el.name());
            for (k, v) in el.attrs().filter(|(k, _)| KEPT_ATTRS.contains(k)) {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(v);
                out.push('"');
            }
            out.push('>');
            for child in node.children() {
                render(child, out);
            }
            out.push_str("</");
            out.push_str(el.name());
            out.push('>');
        }
        Node::Text(text) => out.push_str(text),
        _ => {}
    }
}

fn unwrap_bare_spans(html: &str) -> String {
    let mut out = html.to_string();
    loop {
        let next = BARE_SPAN.replace_all(&out, "$2").to_string();
        if next == out {
            break;
        }
        out = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_class_and_data_attrs_keeps_kept_list() {
        let html = r#"<p class="x" data-y="1" itemprop="name">hi</p>"#;
        let out = strip_and_unwrap(html);
        assert!(!out.contains("class="));
        assert!(!out.contains("data-y"));
        assert!(out.contains("itemprop=\"name\""));
    }

    #[test]
    fn collapses_empty_tags_across_passes() {
        let html = "<div><span><b></b></span></div><p>keep me</p>";
        let out = compress(html);
        assert!(!out.contains("<span"));
        assert!(!out.contains("<b>"));
        assert!(out.contains("keep me"));
    }

    #[test]
    fn single_child_block_wrapper_collapses_to_inner() {
        let html = "<div><p>hello</p></div>";
        let out = strip_and_unwrap(html);
        assert_eq!(out, "<p>hello</p>");
    }

    #[test]
    fn bare_span_wrapper_unwraps_to_text() {
        let out = unwrap_bare_spans("<span>just text</span>");
        assert_eq!(out, "just text");
    }

    #[test]
    fn remerge_sorts_by_numeric_xpath_index() {
        use pagemap_domain::model::ChunkType;
        use std::collections::HashMap;
        let mk = |xpath: &str, html: &str| {
            (
                HtmlChunk {
                    xpath: xpath.to_string(),
                    html: html.to_string(),
                    text: String::new(),
                    tag: "p".into(),
                    chunk_type: ChunkType::TextBlock,
                    attrs: HashMap::new(),
                    parent_xpath: String::new(),
                    depth: 1,
                    in_main: true,
                },
                PruneReason::InMainText,
            )
        };
        let merged = remerge(vec![mk("/div[10]", "<p>ten</p>"), mk("/div[2]", "<p>two</p>")]);
        assert!(merged.find("two").unwrap() < merged.find("ten").unwrap());
    }
}
