//! Schema-specific structured-data extraction: pulls flat field values
//! for the schemas `classify.rs` recognizes out of JSON-LD blocks (and,
//! for wiki pages with no JSON-LD convention, a small DOM rule set),
//! surfaced as `PageMap.metadata["schema_extraction"]`. Additive: a page
//! with no matching markup simply gets no extraction key.

use pagemap_domain::model::{
    GovernmentPageExtraction, NewsArticleExtraction, ProductExtraction, SaaSPageExtraction,
    SchemaExtraction, SchemaName, WikiArticleExtraction,
};
use scraper::{Html, Selector};
use serde_json::Value;

pub fn extract(html: &str, schema: SchemaName) -> Option<SchemaExtraction> {
    let document = Html::parse_document(html);
    let extraction = match schema {
        SchemaName::Product => SchemaExtraction::Product(extract_product(&find_matching_object(&document, schema)?)),
        SchemaName::NewsArticle => {
            SchemaExtraction::NewsArticle(extract_news(&find_matching_object(&document, schema)?))
        }
        SchemaName::GovernmentPage => {
            SchemaExtraction::GovernmentPage(extract_government(&find_matching_object(&document, schema)?))
        }
        SchemaName::SaaSPage => SchemaExtraction::SaaSPage(extract_saas(&find_matching_object(&document, schema)?)),
        SchemaName::WikiArticle => SchemaExtraction::WikiArticle(extract_wiki(&document)),
        _ => return None,
    };
    if is_empty(&extraction) {
        None
    } else {
        Some(extraction)
    }
}

const PRODUCT_TYPES: &[&str] = &["Product"];
const NEWS_TYPES: &[&str] = &["NewsArticle", "Article", "BlogPosting", "ReportageNewsArticle"];
const GOVERNMENT_TYPES: &[&str] = &["GovernmentOrganization", "GovernmentService"];
const SAAS_TYPES: &[&str] = &["SoftwareApplication", "WebApplication"];

fn find_matching_object(document: &Html, schema: SchemaName) -> Option<Value> {
    let target_types = match schema {
        SchemaName::Product => PRODUCT_TYPES,
        SchemaName::NewsArticle => NEWS_TYPES,
        SchemaName::GovernmentPage => GOVERNMENT_TYPES,
        SchemaName::SaaSPage => SAAS_TYPES,
        _ => return None,
    };
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    for el in document.select(&selector) {
        let text: String = el.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&text) else { continue };
        if let Some(found) = find_object_of_type(&value, target_types) {
            return Some(found);
        }
    }
    None
}

fn find_object_of_type(value: &Value, target_types: &[&str]) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let matches = match map.get("@type") {
                Some(Value::String(s)) => target_types.contains(&s.as_str()),
                Some(Value::Array(arr)) => {
                    arr.iter().any(|v| v.as_str().map(|s| target_types.contains(&s)).unwrap_or(false))
                }
                _ => false,
            };
            if matches {
                return Some(value.clone());
            }
            map.get("@graph").and_then(|graph| find_object_of_type(graph, target_types))
        }
        Value::Array(arr) => arr.iter().find_map(|v| find_object_of_type(v, target_types)),
        _ => None,
    }
}

/// Resolve a dotted field path through a JSON-LD object, transparently
/// taking the first element whenever an array is encountered along the
/// way (JSON-LD commonly allows a single value or a list of values).
fn get_path<'a>(obj: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = obj;
    for key in path {
        if let Value::Array(arr) = cur {
            cur = arr.first()?;
        }
        cur = cur.get(key)?;
    }
    if let Value::Array(arr) = cur {
        cur = arr.first()?;
    }
    Some(cur)
}

fn str_at(obj: &Value, path: &[&str]) -> Option<String> {
    get_path(obj, path).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn truncated_str_at(obj: &Value, path: &[&str], max_chars: usize) -> Option<String> {
    str_at(obj, path).map(|s| s.chars().take(max_chars).collect())
}

fn f64_at(obj: &Value, path: &[&str]) -> Option<f64> {
    get_path(obj, path).and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn u32_at(obj: &Value, path: &[&str]) -> Option<u32> {
    f64_at(obj, path).map(|f| f as u32)
}

/// A field like `author`/`brand`/`publisher` is either a bare string or
/// an object (or list of either) carrying a `name`.
fn name_at(obj: &Value, path: &[&str]) -> Option<String> {
    get_path(obj, path).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(m) => m.get("name").and_then(|n| n.as_str()).map(|s| s.to_string()),
        _ => None,
    })
}

fn extract_product(obj: &Value) -> ProductExtraction {
    ProductExtraction {
        name: str_at(obj, &["name"]),
        price: f64_at(obj, &["offers", "price"]),
        currency: str_at(obj, &["offers", "priceCurrency"]),
        original_price: f64_at(obj, &["offers", "highPrice"]),
        image_url: str_at(obj, &["image"]),
        rating: f64_at(obj, &["aggregateRating", "ratingValue"]),
        review_count: u32_at(obj, &["aggregateRating", "reviewCount"]),
        brand: name_at(obj, &["brand"]),
    }
}

fn extract_news(obj: &Value) -> NewsArticleExtraction {
    NewsArticleExtraction {
        headline: str_at(obj, &["headline"]).or_else(|| str_at(obj, &["name"])),
        author: name_at(obj, &["author"]),
        date_published: str_at(obj, &["datePublished"]),
        article_body: truncated_str_at(obj, &["articleBody"], 200),
        publisher: name_at(obj, &["publisher"]),
    }
}

fn extract_saas(obj: &Value) -> SaaSPageExtraction {
    SaaSPageExtraction {
        name: str_at(obj, &["name"]),
        description: truncated_str_at(obj, &["description"], 200),
        primary_language: str_at(obj, &["programmingLanguage"]),
        stars: u32_at(obj, &["aggregateRating", "ratingCount"])
            .or_else(|| u32_at(obj, &["interactionStatistic", "userInteractionCount"])),
        license: str_at(obj, &["license"]),
    }
}

fn extract_government(obj: &Value) -> GovernmentPageExtraction {
    GovernmentPageExtraction {
        title: str_at(obj, &["name"]),
        department: name_at(obj, &["publisher"]).or_else(|| name_at(obj, &["parentOrganization"])),
        description: truncated_str_at(obj, &["description"], 200),
        date: str_at(obj, &["dateModified"]).or_else(|| str_at(obj, &["datePublished"])),
        contact_info: str_at(obj, &["contactPoint", "telephone"]).or_else(|| str_at(obj, &["contactPoint", "email"])),
    }
}

/// Wiki pages rarely ship `Article` JSON-LD with useful fields, so this
/// reads the MediaWiki DOM conventions directly instead.
fn extract_wiki(document: &Html) -> WikiArticleExtraction {
    let title = first_text(document, "#firstHeading, h1");
    let summary = Selector::parse("#mw-content-text p, .mw-parser-output p")
        .ok()
        .and_then(|sel| document.select(&sel).find(|el| !el.text().collect::<String>().trim().is_empty()))
        .map(|el| el.text().collect::<String>().trim().chars().take(200).collect::<String>());
    let categories: Vec<String> = Selector::parse("#catlinks a, .mw-normal-catlinks a")
        .ok()
        .map(|sel| {
            document
                .select(&sel)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let last_edited = first_text(document, "#footer-info-lastmod, #lastmod");

    WikiArticleExtraction {
        title,
        summary,
        categories: if categories.is_empty() { None } else { Some(categories) },
        last_edited,
    }
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    Selector::parse(selector)
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_empty(extraction: &SchemaExtraction) -> bool {
    match extraction {
        SchemaExtraction::Product(p) => {
            p.name.is_none()
                && p.price.is_none()
                && p.currency.is_none()
                && p.original_price.is_none()
                && p.image_url.is_none()
                && p.rating.is_none()
                && p.review_count.is_none()
                && p.brand.is_none()
        }
        SchemaExtraction::NewsArticle(n) => {
            n.headline.is_none() && n.author.is_none() && n.date_published.is_none() && n.article_body.is_none() && n.publisher.is_none()
        }
        SchemaExtraction::WikiArticle(w) => {
            w.title.is_none() && w.summary.is_none() && w.categories.is_none() && w.last_edited.is_none()
        }
        SchemaExtraction::SaaSPage(s) => {
            s.name.is_none() && s.description.is_none() && s.primary_language.is_none() && s.stars.is_none() && s.license.is_none()
        }
        SchemaExtraction::GovernmentPage(g) => {
            g.title.is_none() && g.department.is_none() && g.description.is_none() && g.date.is_none() && g.contact_info.is_none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_product_fields_from_json_ld() {
        let html = r#"<html><script type="application/ld+json">
            {"@type":"Product","name":"Widget","offers":{"price":"19.99","priceCurrency":"USD"},
             "aggregateRating":{"ratingValue":4.5,"reviewCount":120},"brand":{"name":"Acme"}}
        </script></html>"#;
        let extraction = extract(html, SchemaName::Product).unwrap();
        let SchemaExtraction::Product(p) = extraction else { panic!("wrong variant") };
        assert_eq!(p.name.as_deref(), Some("Widget"));
        assert_eq!(p.price, Some(19.99));
        assert_eq!(p.currency.as_deref(), Some("USD"));
        assert_eq!(p.review_count, Some(120));
        assert_eq!(p.brand.as_deref(), Some("Acme"));
    }

    #[test]
    fn extracts_news_article_with_author_object() {
        let html = r#"<html><script type="application/ld+json">
            {"@type":"NewsArticle","headline":"Big story","author":{"name":"Jane Doe"},
             "datePublished":"2026-01-01","publisher":{"name":"Daily Times"}}
        </script></html>"#;
        let extraction = extract(html, SchemaName::NewsArticle).unwrap();
        let SchemaExtraction::NewsArticle(n) = extraction else { panic!("wrong variant") };
        assert_eq!(n.headline.as_deref(), Some("Big story"));
        assert_eq!(n.author.as_deref(), Some("Jane Doe"));
        assert_eq!(n.publisher.as_deref(), Some("Daily Times"));
    }

    #[test]
    fn no_matching_json_ld_yields_none() {
        let html = r#"<html><script type="application/ld+json">{"@type":"Event"}</script></html>"#;
        assert!(extract(html, SchemaName::Product).is_none());
    }

    #[test]
    fn extracts_wiki_fields_from_dom() {
        let html = r#"<html><body>
            <h1 id="firstHeading">Rust (programming language)</h1>
            <div id="mw-content-text"><p>Rust is a multi-paradigm language.</p></div>
            <div id="catlinks"><a>Programming languages</a><a>Systems programming</a></div>
        </body></html>"#;
        let extraction = extract(html, SchemaName::WikiArticle).unwrap();
        let SchemaExtraction::WikiArticle(w) = extraction else { panic!("wrong variant") };
        assert_eq!(w.title.as_deref(), Some("Rust (programming language)"));
        assert!(w.summary.unwrap().contains("multi-paradigm"));
        assert_eq!(w.categories.unwrap().len(), 2);
    }

    #[test]
    fn generic_schema_never_extracts() {
        assert!(extract("<html></html>", SchemaName::Generic).is_none());
    }
}
