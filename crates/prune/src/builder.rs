//! Pruned-context builder (§4.9): turns compressed HTML into the final
//! prose `pruned_context` string within a token budget, dispatched by
//! page type (falling back to schema), with the minimum-content
//! guarantee and pagination/filter-hint extraction layered on top.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use pagemap_domain::model::{Interactable, PageType, Region, SchemaName, ScriptDominance};
use regex::Regex;
use scraper::{Html, Selector};

use crate::budget::count_tokens;
use crate::script_filter;

const NO_MAIN_CONTENT_PAGE_TYPES: &[PageType] = &[PageType::Login, PageType::Error, PageType::Form, PageType::Settings];
const MCG_MIN_RAW_HTML_LEN: usize = 500;
const MCG_NEAR_EMPTY_TOKEN_THRESHOLD: usize = 5;
const MAX_FILTER_REFS: usize = 10;

pub struct CompressorContext<'a> {
    pub pruned_html: &'a str,
    pub raw_html: Option<&'a str>,
    pub max_tokens: u32,
    pub metadata: HashMap<String, serde_json::Value>,
    pub locale: &'a str,
    pub page_dominant_script: ScriptDominance,
}

pub struct PrunedContext {
    pub context: String,
    pub tokens: u32,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Build the final pruned-context string. Dispatches on `page_type`
/// first, then `schema_name`, applies the script-dominance filter and
/// token-budget truncation, and runs the minimum-content guarantee and
/// pagination-hint extraction.
pub fn build(
    pruned_html: &str,
    raw_html: Option<&str>,
    page_type: PageType,
    schema_name: SchemaName,
    max_tokens: u32,
    locale: &str,
    interactables: &[Interactable],
) -> PrunedContext {
    let page_dominant_script = raw_html
        .map(|h| script_filter::classify(&visible_sample(h)))
        .unwrap_or(ScriptDominance::Latin);

    let mut metadata = HashMap::new();
    let mut ctx = CompressorContext {
        pruned_html,
        raw_html,
        max_tokens,
        metadata: HashMap::new(),
        locale,
        page_dominant_script,
    };

    let mut context = dispatch(page_type, schema_name, &mut ctx);
    metadata.extend(ctx.metadata.drain());

    let mut tokens = count_tokens(&context) as u32;

    if tokens <= MCG_NEAR_EMPTY_TOKEN_THRESHOLD as u32
        && !NO_MAIN_CONTENT_PAGE_TYPES.contains(&page_type)
        && raw_html.map(|h| h.len() > MCG_MIN_RAW_HTML_LEN).unwrap_or(false)
    {
        context = extract_minimum_content(pruned_html, raw_html.unwrap_or(""), max_tokens);
        tokens = count_tokens(&context) as u32;
        metadata.insert("_mcg_activated".to_string(), serde_json::Value::Bool(true));
    }

    if matches!(page_type, PageType::SearchResults | PageType::Listing) {
        if let Some(hints) = extract_navigation_hints(raw_html.unwrap_or(""), locale, interactables) {
            metadata.insert("navigation_hints".to_string(), hints);
        }
    }

    PrunedContext { context, tokens, metadata }
}

fn dispatch(page_type: PageType, schema_name: SchemaName, ctx: &mut CompressorContext) -> String {
    match page_type {
        PageType::ProductDetail => compress_for_product(ctx),
        PageType::SearchResults | PageType::Listing => compress_for_search_results(ctx),
        PageType::Article | PageType::News => compress_for_article(ctx),
        PageType::Landing => compress_for_landing(ctx),
        PageType::Dashboard if looks_like_article_list(ctx.pruned_html) => compress_for_news_portal(ctx),
        _ => match schema_name {
            SchemaName::SaaSPage => compress_for_saas(ctx),
            SchemaName::GovernmentPage => compress_for_government(ctx),
            SchemaName::WikiArticle => compress_for_article(ctx),
            SchemaName::VideoObject => compress_for_video(ctx),
            _ => compress_default(ctx),
        },
    }
}

fn looks_like_article_list(html: &str) -> bool {
    let document = Html::parse_fragment(html);
    document.select(&Selector::parse("article,h2,h3").unwrap()).count() >= 4
}

/// Strip markup into readable prose: block-level tags become paragraph
/// breaks, inline tags stay inline, script/style are never reached since
/// they were dropped during compression.
fn html_to_prose(html: &str) -> String {
    let document = Html::parse_fragment(html);
    let mut out = String::new();
    for text in document.root_element().text() {
        out.push_str(text);
        out.push(' ');
    }
    let mut paragraphs = Vec::new();
    for el in document.select(&Selector::parse("p,li,h1,h2,h3,h4,h5,h6,td,th").unwrap()) {
        let text: String = el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }
    if paragraphs.is_empty() {
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        paragraphs.join("\n")
    }
}

fn apply_script_filter(prose: &str, dominant: ScriptDominance) -> String {
    prose
        .lines()
        .filter_map(|line| script_filter::filter_run(line, dominant))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_to_budget(text: &str, max_tokens: u32) -> String {
    if count_tokens(text) as u32 <= max_tokens {
        return text.to_string();
    }
    // Binary-search the character cut point so we don't re-tokenize the
    // whole string on every trim iteration.
    let chars: Vec<char> = text.chars().collect();
    let (mut lo, mut hi) = (0usize, chars.len());
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        let candidate: String = chars[..mid].iter().collect();
        if count_tokens(&candidate) as u32 <= max_tokens {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    chars[..lo].iter().collect()
}

fn compress_default(ctx: &mut CompressorContext) -> String {
    let prose = html_to_prose(ctx.pruned_html);
    let filtered = apply_script_filter(&prose, ctx.page_dominant_script);
    truncate_to_budget(&filtered, ctx.max_tokens)
}

fn compress_for_product(ctx: &mut CompressorContext) -> String {
    // Price/availability chunks already survive the kept/removed pass
    // with `schema-match`/`in-main-high-value-short`; prose order already
    // favors them since they sit near the top of product DOMs.
    compress_default(ctx)
}

fn compress_for_search_results(ctx: &mut CompressorContext) -> String {
    let document = Html::parse_fragment(ctx.pruned_html);
    let mut items = Vec::new();
    for (i, el) in document.select(&Selector::parse("li,article,h2,h3").unwrap()).enumerate() {
        let text: String = el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            items.push(format!("{}. {}", i + 1, text));
        }
    }
    let prose = if items.is_empty() { html_to_prose(ctx.pruned_html) } else { items.join("\n") };
    let filtered = apply_script_filter(&prose, ctx.page_dominant_script);
    truncate_to_budget(&filtered, ctx.max_tokens)
}

fn compress_for_article(ctx: &mut CompressorContext) -> String {
    compress_default(ctx)
}

fn compress_for_landing(ctx: &mut CompressorContext) -> String {
    compress_default(ctx)
}

fn compress_for_news_portal(ctx: &mut CompressorContext) -> String {
    compress_for_search_results(ctx)
}

fn compress_for_saas(ctx: &mut CompressorContext) -> String {
    compress_default(ctx)
}

fn compress_for_government(ctx: &mut CompressorContext) -> String {
    compress_default(ctx)
}

fn compress_for_video(ctx: &mut CompressorContext) -> String {
    compress_default(ctx)
}

/// `_extract_minimum_content`: pulls, in priority order, OpenGraph
/// title/description, then meaningful text from `pruned_html`, then from
/// `raw_html`.
fn extract_minimum_content(pruned_html: &str, raw_html: &str, max_tokens: u32) -> String {
    if let Some(og) = extract_opengraph(raw_html) {
        return truncate_to_budget(&og, max_tokens);
    }
    let from_pruned = html_to_prose(pruned_html);
    if count_tokens(&from_pruned) > 3 {
        return truncate_to_budget(&from_pruned, max_tokens);
    }
    truncate_to_budget(&html_to_prose(raw_html), max_tokens)
}

fn extract_opengraph(raw_html: &str) -> Option<String> {
    let document = Html::parse_document(raw_html);
    let meta_sel = Selector::parse("meta").ok()?;
    let mut title = None;
    let mut description = None;
    for meta in document.select(&meta_sel) {
        match meta.value().attr("property").or_else(|| meta.value().attr("name")) {
            Some("og:title") => title = meta.value().attr("content").map(str::to_string),
            Some("og:description") => description = meta.value().attr("content").map(str::to_string),
            _ => {}
        }
    }
    match (title, description) {
        (Some(t), Some(d)) => Some(format!("{t}\n{d}")),
        (Some(t), None) => Some(t),
        (None, Some(d)) => Some(d),
        (None, None) => None,
    }
}

static PAGE_OF_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)page\s+(\d+)\s+of\s+(\d+)|(\d+)\s*총\s*(\d+)\s*건|(\d+)\s*件中|seite\s+(\d+)\s+von\s+(\d+)")
        .unwrap()
});
static NEXT_WORDS: &[&str] = &["next", "다음", "次へ", "nächste", "siguiente", "suivant"];
static PREV_WORDS: &[&str] = &["previous", "prev", "이전", "前へ", "zurück", "anterior", "précédent"];
static LOAD_MORE_WORDS: &[&str] = &["load more", "더 보기", "もっと見る", "mehr laden", "cargar más"];

#[derive(Default)]
struct PaginationHints {
    current_page: Option<u32>,
    total_pages: Option<u32>,
    next_ref: Option<u32>,
    prev_ref: Option<u32>,
    load_more_ref: Option<u32>,
}

/// Extract structured pagination info via multilingual regex and match
/// against interactables to find next/prev/load-more refs; collect
/// `complementary`-region interactables as capped `filter_refs`.
fn extract_navigation_hints(raw_html: &str, _locale: &str, interactables: &[Interactable]) -> Option<serde_json::Value> {
    let mut hints = PaginationHints::default();

    if let Some(caps) = PAGE_OF_PATTERN.captures(raw_html) {
        let nums: Vec<u32> = caps.iter().skip(1).filter_map(|m| m.and_then(|m| m.as_str().parse().ok())).collect();
        if nums.len() >= 2 {
            hints.current_page = Some(nums[0]);
            hints.total_pages = Some(nums[1]);
        }
    }

    for i in interactables {
        let lower = i.name.to_lowercase();
        if NEXT_WORDS.iter().any(|w| lower.contains(w)) {
            hints.next_ref = Some(i.r#ref);
        } else if PREV_WORDS.iter().any(|w| lower.contains(w)) {
            hints.prev_ref = Some(i.r#ref);
        } else if LOAD_MORE_WORDS.iter().any(|w| lower.contains(w)) {
            hints.load_more_ref = Some(i.r#ref);
        }
    }

    let filter_refs: Vec<u32> = interactables
        .iter()
        .filter(|i| i.region == Region::Complementary)
        .take(MAX_FILTER_REFS)
        .map(|i| i.r#ref)
        .collect();

    if hints.current_page.is_none() && hints.next_ref.is_none() && hints.prev_ref.is_none() && filter_refs.is_empty() {
        return None;
    }

    Some(serde_json::json!({
        "current_page": hints.current_page,
        "total_pages": hints.total_pages,
        "next_ref": hints.next_ref,
        "prev_ref": hints.prev_ref,
        "load_more_ref": hints.load_more_ref,
        "filter_refs": filter_refs,
    }))
}

fn visible_sample(html: &str) -> String {
    let document = Html::parse_fragment(html);
    document.root_element().text().collect::<Vec<_>>().join(" ").chars().take(2000).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_compressor_produces_prose_under_budget() {
        let html = "<p>First paragraph of real content here.</p><p>Second paragraph also real.</p>";
        let out = build(html, Some(html), PageType::Unknown, SchemaName::Generic, 50, "en", &[]);
        assert!(out.tokens <= 50);
        assert!(out.context.contains("First paragraph"));
    }

    #[test]
    fn search_results_compressor_numbers_list_items() {
        let html = "<li>Item one</li><li>Item two</li>";
        let out = build(html, Some(html), PageType::SearchResults, SchemaName::Generic, 100, "en", &[]);
        assert!(out.context.starts_with("1. Item one"));
    }

    #[test]
    fn mcg_activates_on_near_empty_output_with_opengraph_fallback() {
        let raw = format!(
            "<html><head><meta property=\"og:title\" content=\"Great Page\"><meta property=\"og:description\" content=\"A description\"></head><body>{}</body></html>",
            "x".repeat(600)
        );
        let out = build("", Some(&raw), PageType::Article, SchemaName::Generic, 50, "en", &[]);
        assert_eq!(out.metadata.get("_mcg_activated"), Some(&serde_json::Value::Bool(true)));
        assert!(out.context.contains("Great Page"));
    }

    #[test]
    fn mcg_does_not_activate_for_login_page_type() {
        let raw = "x".repeat(600);
        let out = build("", Some(&raw), PageType::Login, SchemaName::Generic, 50, "en", &[]);
        assert!(!out.metadata.contains_key("_mcg_activated"));
    }

    #[test]
    fn pagination_hints_extracted_for_search_results() {
        let raw = "<body>Page 2 of 10</body>";
        let interactables = vec![Interactable {
            r#ref: 3,
            role: "link".into(),
            name: "Next".into(),
            affordance: pagemap_domain::model::Affordance::Click,
            region: Region::Main,
            tier: pagemap_domain::model::Tier::Named,
            value: None,
            options: vec![],
            selector: None,
        }];
        let out = build("<p>results</p>", Some(raw), PageType::SearchResults, SchemaName::Generic, 200, "en", &interactables);
        let hints = out.metadata.get("navigation_hints").unwrap();
        assert_eq!(hints["current_page"], 2);
        assert_eq!(hints["total_pages"], 10);
        assert_eq!(hints["next_ref"], 3);
    }
}
