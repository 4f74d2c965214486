//! Page-type and schema classification: JSON-LD + URL-shape heuristics
//! for `SchemaName`, URL/title/content heuristics for `PageType`, plus
//! the blocked/captcha detector the assembler runs as its last step
//! (§4.10 point 8).

use pagemap_domain::model::PageType;
use pagemap_domain::model::SchemaName;
use scraper::{Html, Selector};
use serde_json::Value;

/// Classify both the structured-data schema and the UI page type. Schema
/// is derived first since several page-type rules fall back on it.
pub fn classify(url: &str, html: &str, title: &str) -> (PageType, SchemaName) {
    let schema = classify_schema(html, url);
    let page_type = classify_page_type(url, html, title, schema);
    (page_type, schema)
}

fn classify_schema(html: &str, url: &str) -> SchemaName {
    if let Some(types) = json_ld_types(html) {
        for t in &types {
            let schema = match t.as_str() {
                "Product" => Some(SchemaName::Product),
                "NewsArticle" | "Article" | "BlogPosting" | "ReportageNewsArticle" => Some(SchemaName::NewsArticle),
                "FAQPage" => Some(SchemaName::FaqPage),
                "Event" => Some(SchemaName::Event),
                "VideoObject" => Some(SchemaName::VideoObject),
                "LocalBusiness" | "Restaurant" | "Store" => Some(SchemaName::LocalBusiness),
                "GovernmentOrganization" | "GovernmentService" => Some(SchemaName::GovernmentPage),
                "SoftwareApplication" | "WebApplication" => Some(SchemaName::SaaSPage),
                _ => None,
            };
            if let Some(schema) = schema {
                return schema;
            }
        }
    }

    if url.contains(".gov") {
        return SchemaName::GovernmentPage;
    }
    if url.contains("wikipedia.org") {
        return SchemaName::WikiArticle;
    }
    if url.contains("/pricing") || url.contains("/features") {
        return SchemaName::SaaSPage;
    }
    SchemaName::Generic
}

/// Collect every `@type` value out of the page's `application/ld+json`
/// script tags, flattening `@graph` arrays and `@type` arrays.
fn json_ld_types(html: &str) -> Option<Vec<String>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    let mut types = Vec::new();
    for el in document.select(&selector) {
        let text: String = el.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&text) else { continue };
        collect_types(&value, &mut types);
    }
    if types.is_empty() {
        None
    } else {
        Some(types)
    }
}

fn collect_types(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(t) = map.get("@type") {
                match t {
                    Value::String(s) => out.push(s.clone()),
                    Value::Array(arr) => {
                        for v in arr {
                            if let Value::String(s) = v {
                                out.push(s.clone());
                            }
                        }
                    }
                    _ => {}
                }
            }
            if let Some(graph) = map.get("@graph") {
                collect_types(graph, out);
            }
        }
        Value::Array(arr) => {
            for v in arr {
                collect_types(v, out);
            }
        }
        _ => {}
    }
}

fn classify_page_type(url: &str, html: &str, title: &str, schema: SchemaName) -> PageType {
    let path = url::Url::parse(url).map(|u| u.path().to_lowercase()).unwrap_or_default();
    let title_lower = title.to_lowercase();

    if is_login_path(&path) {
        return PageType::Login;
    }
    if path.contains("checkout") || path.contains("/cart") {
        return PageType::Checkout;
    }
    if path.contains("search") || path.contains("/s/") || url.contains("?q=") || url.contains("&q=") {
        return PageType::SearchResults;
    }
    if path.contains("settings") || path.contains("preferences") || path.contains("account") {
        return PageType::Settings;
    }
    if path.contains("dashboard") || path.contains("/admin") {
        return PageType::Dashboard;
    }
    if path.contains("faq") || path.contains("/help") || matches!(schema, SchemaName::FaqPage) {
        return PageType::HelpFaq;
    }
    if path.contains("/docs") || path.contains("/documentation") {
        return PageType::Documentation;
    }
    if title_lower.contains("404")
        || title_lower.contains("page not found")
        || title_lower.contains("not found")
    {
        return PageType::Error;
    }
    if matches!(schema, SchemaName::Product) {
        return PageType::ProductDetail;
    }
    if matches!(schema, SchemaName::VideoObject) {
        return PageType::Video;
    }
    if matches!(schema, SchemaName::NewsArticle) {
        return if path.contains("/news") { PageType::News } else { PageType::Article };
    }
    if is_category_listing(&path) {
        return PageType::Listing;
    }
    if path.is_empty() || path == "/" {
        return PageType::Landing;
    }
    if contains_form_markers(html) {
        return PageType::Form;
    }
    PageType::Unknown
}

fn is_login_path(path: &str) -> bool {
    ["login", "signin", "sign-in", "/auth"].iter().any(|p| path.contains(p))
}

fn is_category_listing(path: &str) -> bool {
    ["category", "categories", "/products", "/listing", "/shop"].iter().any(|p| path.contains(p))
}

fn contains_form_markers(html: &str) -> bool {
    let document = Html::parse_document(html);
    Selector::parse("form")
        .ok()
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false)
}

const CHALLENGE_MARKERS: &[&str] = &[
    "checking your browser",
    "attention required",
    "cloudflare",
    "are you a human",
    "are you a robot",
    "captcha",
    "access denied",
    "unusual traffic",
];

const SHORT_BODY_LEN: usize = 1500;

/// Blocked/captcha classification (§4.10 point 8): a very short body
/// combined with a known challenge-page marker, or an explicit HTTP
/// status in {403, 503}.
pub fn detect_blocked(html: &str, title: &str, http_status: Option<u16>) -> Option<Value> {
    let lower_html = html.to_lowercase();
    let lower_title = title.to_lowercase();

    let status_blocked = matches!(http_status, Some(403) | Some(503));
    let marker_hit = CHALLENGE_MARKERS
        .iter()
        .find(|m| lower_html.contains(*m) || lower_title.contains(*m));
    let short_body = html.len() < SHORT_BODY_LEN;

    if status_blocked || (marker_hit.is_some() && short_body) {
        Some(serde_json::json!({
            "reason": marker_hit.copied().unwrap_or("http_status"),
            "http_status": http_status,
        }))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_json_ld_classifies_as_product_detail() {
        let html = r#"<html><script type="application/ld+json">{"@type":"Product","name":"Widget"}</script></html>"#;
        let (page_type, schema) = classify("https://shop.example.com/widget", html, "Widget");
        assert_eq!(schema, SchemaName::Product);
        assert_eq!(page_type, PageType::ProductDetail);
    }

    #[test]
    fn login_path_overrides_schema() {
        let (page_type, _) = classify("https://example.com/login", "<html></html>", "Sign in");
        assert_eq!(page_type, PageType::Login);
    }

    #[test]
    fn blocked_requires_short_body_and_marker() {
        let long_html = format!("<html>{}cloudflare{}</html>", "x".repeat(2000), "y".repeat(2000));
        assert!(detect_blocked(&long_html, "", None).is_none());
        let short_html = "<html>checking your browser before accessing</html>";
        assert!(detect_blocked(short_html, "", None).is_some());
    }

    #[test]
    fn http_403_is_always_blocked() {
        assert!(detect_blocked("<html>normal page</html>", "Home", Some(403)).is_some());
    }
}
