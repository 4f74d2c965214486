//! `build --offline`: construct a `PageMap` straight from a raw HTML
//! string, with no browser, navigation, or AX tree. Interactables are
//! recovered with a small HTML rule set instead of the accessibility
//! walk §4.7 uses.

use std::collections::HashMap;
use std::time::Instant;

use pagemap_domain::config::PruneConfig;
use pagemap_domain::model::{Affordance, Interactable, PageMap, Region, Tier};
use scraper::{ElementRef, Html, Selector};

use crate::classify::{classify, detect_blocked};
use crate::extraction;

const CTA_KEYWORDS: &[&str] = &[
    "buy", "cart", "checkout", "sign up", "signup", "login", "log in", "subscribe", "download",
    "register", "get started", "learn more", "add to cart", "continue", "submit", "next",
    "order now", "shop now",
];

/// Build a `PageMap` for `html` without touching a browser. Used by
/// `build --offline` and as the fallback path when a browser is
/// unavailable for a one-shot render.
pub fn build_page_map_offline(html: &str, url: &str, locale: &str, prune_cfg: &PruneConfig) -> PageMap {
    let start = Instant::now();
    let document = Html::parse_document(html);
    let title = extract_title(&document);

    let interactables = extract_interactables(&document);
    let (page_type, schema) = classify(url, html, &title);

    let output = pagemap_prune::run_pipeline(
        html,
        page_type,
        schema,
        locale,
        &interactables,
        prune_cfg.aom_threshold,
        prune_cfg.base_pruned_budget,
        prune_cfg.base_total_budget,
    );

    let mut metadata = output.metadata;
    metadata.insert("schema_name".to_string(), serde_json::to_value(schema).unwrap());
    metadata.insert("mode".to_string(), serde_json::Value::String("offline".to_string()));
    if let Some(extracted) = extraction::extract(html, schema) {
        metadata.insert("schema_extraction".to_string(), serde_json::to_value(extracted).unwrap());
    }

    let mut warnings = Vec::new();
    let (page_type, metadata) = apply_blocked_classification(page_type, html, &title, None, metadata, &mut warnings);

    PageMap {
        url: url.to_string(),
        title,
        page_type,
        interactables,
        pruned_context: output.pruned_context,
        pruned_tokens: output.pruned_tokens,
        generation_ms: start.elapsed().as_secs_f64() * 1000.0,
        images: extract_images(&document, url),
        metadata,
        warnings,
    }
}

pub(crate) fn apply_blocked_classification(
    page_type: pagemap_domain::model::PageType,
    html: &str,
    title: &str,
    http_status: Option<u16>,
    mut metadata: HashMap<String, serde_json::Value>,
    warnings: &mut Vec<String>,
) -> (pagemap_domain::model::PageType, HashMap<String, serde_json::Value>) {
    if let Some(info) = detect_blocked(html, title, http_status) {
        metadata.insert("blocked_info".to_string(), info);
        warnings.push("page appears to be an anti-bot challenge or block page".to_string());
        return (pagemap_domain::model::PageType::Blocked, metadata);
    }
    (page_type, metadata)
}

fn extract_title(document: &Html) -> String {
    Selector::parse("title")
        .ok()
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn extract_interactables(document: &Html) -> Vec<Interactable> {
    let mut out = Vec::new();
    let mut r#ref = 0u32;

    let clickable = Selector::parse("button, input[type=submit], input[type=button], a").unwrap();
    for el in document.select(&clickable) {
        let is_link = el.value().name() == "a";
        let name = accessible_name(&el);

        if is_link && !is_cta_link(&name, &el) {
            continue;
        }

        r#ref += 1;
        out.push(Interactable {
            r#ref,
            role: if is_link { "link".to_string() } else { "button".to_string() },
            name: name.clone(),
            affordance: Affordance::Click,
            region: Region::Main,
            tier: if name.trim().is_empty() { Tier::Unnamed } else { Tier::Named },
            value: None,
            options: Vec::new(),
            selector: selector_for(&el),
        });
    }

    let typed_input = Selector::parse("input:not([type=hidden]):not([type=submit]):not([type=button])").unwrap();
    for el in document.select(&typed_input) {
        r#ref += 1;
        let name = accessible_name(&el);
        out.push(Interactable {
            r#ref,
            role: "textbox".to_string(),
            name: name.clone(),
            affordance: Affordance::Type,
            region: Region::Main,
            tier: if name.trim().is_empty() { Tier::Unnamed } else { Tier::Named },
            value: el.value().attr("value").map(|v| v.to_string()),
            options: Vec::new(),
            selector: selector_for(&el),
        });
    }

    let select_sel = Selector::parse("select").unwrap();
    let option_sel = Selector::parse("option").unwrap();
    for el in document.select(&select_sel) {
        let options: Vec<String> = el.select(&option_sel).map(|o| o.text().collect::<String>().trim().to_string()).collect();
        r#ref += 1;
        let name = accessible_name(&el);
        out.push(Interactable {
            r#ref,
            role: "combobox".to_string(),
            name: name.clone(),
            affordance: Affordance::Select,
            region: Region::Main,
            tier: if name.trim().is_empty() { Tier::Unnamed } else { Tier::Named },
            value: None,
            options,
            selector: selector_for(&el),
        });
    }

    out
}

fn accessible_name(el: &ElementRef) -> String {
    if let Some(aria) = el.value().attr("aria-label") {
        if !aria.trim().is_empty() {
            return aria.trim().to_string();
        }
    }
    if let Some(placeholder) = el.value().attr("placeholder") {
        if !placeholder.trim().is_empty() {
            return placeholder.trim().to_string();
        }
    }
    if let Some(value) = el.value().attr("value") {
        if !value.trim().is_empty() {
            return value.trim().to_string();
        }
    }
    el.text().collect::<String>().trim().to_string()
}

fn is_cta_link(name: &str, el: &ElementRef) -> bool {
    let lower = name.to_lowercase();
    let class = el.value().attr("class").unwrap_or("").to_lowercase();
    CTA_KEYWORDS.iter().any(|kw| lower.contains(kw) || class.contains(kw.replace(' ', "-").as_str()))
}

fn selector_for(el: &ElementRef) -> Option<String> {
    el.value().attr("id").map(|id| format!("#{id}"))
}

pub(crate) fn extract_images(document: &Html, base_url: &str) -> Vec<String> {
    let base = url::Url::parse(base_url).ok();
    let img_sel = Selector::parse("img[src]").unwrap();
    document
        .select(&img_sel)
        .filter_map(|el| el.value().attr("src"))
        .filter_map(|src| match &base {
            Some(b) => b.join(src).ok().map(|u| u.to_string()),
            None => Some(src.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_buttons_and_cta_links() {
        let html = r#"<html><body>
            <button>Submit</button>
            <a href="/cart" class="buy-now">Add to Cart</a>
            <a href="/about">About us</a>
        </body></html>"#;
        let document = Html::parse_document(html);
        let items = extract_interactables(&document);
        assert!(items.iter().any(|i| i.name == "Submit"));
        assert!(items.iter().any(|i| i.name == "Add to Cart"));
        assert!(!items.iter().any(|i| i.name == "About us"));
    }

    #[test]
    fn extracts_typed_inputs_and_selects() {
        let html = r#"<html><body>
            <input type="text" placeholder="Email">
            <input type="hidden" value="token">
            <select><option>US</option><option>CA</option></select>
        </body></html>"#;
        let document = Html::parse_document(html);
        let items = extract_interactables(&document);
        assert!(items.iter().any(|i| i.affordance == Affordance::Type && i.name == "Email"));
        assert!(!items.iter().any(|i| i.value.as_deref() == Some("token")));
        let select = items.iter().find(|i| i.affordance == Affordance::Select).unwrap();
        assert_eq!(select.options, vec!["US".to_string(), "CA".to_string()]);
    }

    #[test]
    fn build_page_map_offline_runs_end_to_end() {
        let html = "<html><head><title>Shop</title></head><body><button>Buy now</button></body></html>";
        let cfg = PruneConfig::default();
        let map = build_page_map_offline(html, "https://shop.example.com/", "en", &cfg);
        assert_eq!(map.title, "Shop");
        assert!(map.has_contiguous_refs());
    }
}
