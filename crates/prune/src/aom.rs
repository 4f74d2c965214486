//! AOM (accessible-object-model) pre-filter: walks the DOM once, scores
//! every element `weight ∈ [0,1]`, and removes elements (and all
//! descendants) scoring below `threshold`, tagging each removal with a
//! `reason` string.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use pagemap_domain::model::SchemaName;
use regex::Regex;
use scraper::{Html, Selector};

static NOISE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bad[-_]?\b|advertis|sponsor|banner|recommend|related|sidebar|popup|modal|cookie|tracking|overlay|promo|widget|toast|snackbar").unwrap()
});

static CONTENT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)article|content|entry|post|story").unwrap());

const LINK_DENSITY_TAGS: &[&str] = &["div", "li", "td", "th", "p", "blockquote"];
const MIN_TEXT_LEN_FOR_LINK_DENSITY: usize = 50;

/// Minimal view of one element needed to score it; decoupled from the DOM
/// library so the weight table is unit-testable on its own.
#[derive(Debug, Clone, Default)]
pub struct ElementContext<'a> {
    pub tag: &'a str,
    pub role: Option<&'a str>,
    pub aria_hidden: bool,
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub section_labeled: bool,
    pub is_body_direct_child: bool,
    pub class_and_id: &'a str,
    pub has_visible_form_controls: bool,
    pub text_len: usize,
    pub link_text_len: usize,
    pub schema: SchemaName,
}

/// Score one element per the fixed priority table. Returns `(weight, reason)`.
pub fn compute_weight(ctx: &ElementContext) -> (f64, String) {
    if let Some(role) = ctx.role {
        match role {
            "navigation" | "banner" | "contentinfo" => {
                if role == "contentinfo" && ctx.schema == SchemaName::GovernmentPage {
                    return (0.6, "footer-gov-exception".to_string());
                }
                return (0.0, format!("role={role}"));
            }
            "complementary" => {
                return if ctx.has_visible_form_controls {
                    (0.7, "filter-sidebar".to_string())
                } else {
                    (0.3, "role=complementary".to_string())
                };
            }
            "main" | "article" => return (1.0, format!("role={role}")),
            "region" => return (0.8, "role=region".to_string()),
            _ => {}
        }
    }

    match ctx.tag {
        "nav" => return (0.0, "semantic-nav".to_string()),
        "aside" => {
            return if ctx.has_visible_form_controls {
                (0.7, "filter-sidebar".to_string())
            } else {
                (0.3, "semantic-aside".to_string())
            };
        }
        "header" | "footer" => {
            if ctx.is_body_direct_child {
                if ctx.tag == "footer" && ctx.schema == SchemaName::GovernmentPage {
                    return (0.6, "footer-gov-exception".to_string());
                }
                return (0.0, format!("semantic-{}", ctx.tag));
            }
            return (0.8, format!("semantic-{}-nested", ctx.tag));
        }
        "main" | "article" => return (1.0, format!("semantic-{}", ctx.tag)),
        "section" => {
            return if ctx.section_labeled {
                (0.8, "semantic-section-labeled".to_string())
            } else {
                (0.6, "semantic-section-unlabeled".to_string())
            };
        }
        _ => {}
    }

    if ctx.aria_hidden {
        return (0.0, "aria-hidden".to_string());
    }
    if ctx.display_none {
        return (0.0, "display-none".to_string());
    }
    if ctx.visibility_hidden {
        return (0.0, "visibility-hidden".to_string());
    }

    let noise_count = NOISE_PATTERN.find_iter(ctx.class_and_id).count();
    let content_count = CONTENT_PATTERN.find_iter(ctx.class_and_id).count();
    if noise_count >= 2 && content_count == 0 {
        return (0.2, format!("noise-pattern({noise_count})"));
    }
    if noise_count >= 2 && content_count >= 1 {
        return (0.7, format!("content-override-noise({content_count}vs{noise_count})"));
    }
    if content_count >= 1 {
        return (1.0, format!("content-pattern({content_count})"));
    }

    if LINK_DENSITY_TAGS.contains(&ctx.tag) && ctx.text_len > MIN_TEXT_LEN_FOR_LINK_DENSITY {
        let density = ctx.link_text_len as f64 / ctx.text_len.max(1) as f64;
        if density > 0.8 {
            return (0.2, format!("link-density-high({density:.2})"));
        }
        if density > 0.5 {
            return (0.4, format!("link-density({density:.2})"));
        }
    }

    (1.0, "default".to_string())
}

/// Maps a removal reason string to the landmark region it vacated, per
/// `derive_pruned_regions`. Returns `None` for reasons with no region
/// mapping (noise, link-density).
pub fn region_for_removal_reason(reason: &str) -> Option<&'static str> {
    if reason.starts_with("semantic-nav") || reason == "role=navigation" {
        Some("navigation")
    } else if reason.starts_with("semantic-header") || reason == "role=banner" {
        Some("header")
    } else if reason.starts_with("semantic-footer") || reason == "role=contentinfo" {
        Some("footer")
    } else if reason.starts_with("semantic-aside") || reason == "role=complementary" {
        Some("complementary")
    } else {
        None
    }
}

/// Result of one AOM pass: the surviving HTML and a counter of removal
/// reasons (for `derive_pruned_regions` / diagnostics metadata).
pub struct AomResult {
    pub html: String,
    pub removal_reasons: HashMap<String, u32>,
}

/// Whitelist a container whose children form 3+ structurally-similar
/// siblings with link-density-heavy content (product grids, HN tables,
/// news lists). Whitelisted nodes are protected from the link-density
/// penalty but NOT from hidden-content removal.
pub fn is_grid_candidate(child_tags: &[&str], child_link_densities: &[f64]) -> bool {
    if child_tags.len() < 3 {
        return false;
    }
    let first_tag = child_tags[0];
    let same_tag_count = child_tags.iter().filter(|t| **t == first_tag).count();
    let similar_structure = same_tag_count as f64 / child_tags.len() as f64 >= 0.8;
    let link_heavy = child_link_densities.iter().filter(|d| **d > 0.3).count() as f64 / child_link_densities.len().max(1) as f64
        >= 0.6;
    similar_structure && link_heavy
}

/// Walk `html`, score every element, and strip anything under `threshold`
/// (and all of its descendants), except `body`/`html`/`main` which are
/// never removed regardless of weight.
pub fn filter(html: &str, threshold: f64, schema: SchemaName) -> AomResult {
    let document = Html::parse_fragment(html);
    let body_selector = Selector::parse("body").unwrap();
    let mut removal_reasons: HashMap<String, u32> = HashMap::new();

    let mut to_remove: Vec<ego_tree::NodeId> = Vec::new();
    let grid_whitelist = collect_grid_whitelist(&document);

    for element in document.select(&Selector::parse("*").unwrap()) {
        let tag = element.value().name();
        if matches!(tag, "body" | "html" | "main") {
            continue;
        }

        let class_and_id = format!(
            "{} {}",
            element.value().attr("class").unwrap_or(""),
            element.value().attr("id").unwrap_or("")
        );
        let role = element.value().attr("role");
        let style = element.value().attr("style").unwrap_or("");
        let aria_hidden = element.value().attr("aria-hidden") == Some("true");
        let is_body_direct_child = element
            .parent()
            .and_then(|p| p.value().as_element())
            .map(|p| p.name() == "body")
            .unwrap_or(false);
        let section_labeled = element.value().attr("aria-label").is_some() || element.value().attr("aria-labelledby").is_some();
        let has_visible_form_controls = element
            .select(&Selector::parse("input,select,textarea").unwrap())
            .any(|n| n.value().attr("type") != Some("hidden"));

        let text: String = element.text().collect();
        let text_len = text.trim().len();
        let link_text_len: usize = element
            .select(&Selector::parse("a").unwrap())
            .map(|a| a.text().collect::<String>().trim().len())
            .sum();

        let node_id = element.id();
        let whitelisted = grid_whitelist.contains(&node_id);

        let ctx = ElementContext {
            tag,
            role,
            aria_hidden,
            display_none: style.contains("display:none") || style.contains("display: none"),
            visibility_hidden: style.contains("visibility:hidden") || style.contains("visibility: hidden"),
            section_labeled,
            is_body_direct_child,
            class_and_id: &class_and_id,
            has_visible_form_controls,
            text_len,
            link_text_len,
            schema,
        };

        let (mut weight, reason) = compute_weight(&ctx);
        if whitelisted && reason.starts_with("link-density") {
            weight = 1.0;
        }

        if weight < threshold {
            *removal_reasons.entry(reason).or_insert(0) += 1;
            to_remove.push(node_id);
        }
    }

    let mut tree = document.tree.clone();
    for id in dedup_top_level(&tree, to_remove) {
        if let Some(mut node) = tree.get_mut(id) {
            node.detach();
        }
    }

    let rendered = find_element(&tree, "body")
        .or_else(|| find_element(&tree, "html"))
        .map(|el| el.inner_html())
        .unwrap_or_default();
    let _ = body_selector;

    AomResult {
        html: rendered,
        removal_reasons,
    }
}

fn find_element<'a>(tree: &'a ego_tree::Tree<scraper::Node>, tag: &str) -> Option<scraper::ElementRef<'a>> {
    tree.nodes()
        .find(|n| n.value().as_element().map(|e| e.name() == tag).unwrap_or(false))
        .and_then(scraper::ElementRef::wrap)
}

/// Removing an ancestor already removes its descendants; detaching a
/// descendant whose ancestor is also queued is redundant and, depending on
/// traversal order, can panic on an already-detached node. Keep only
/// top-level removal targets.
fn dedup_top_level(tree: &ego_tree::Tree<scraper::Node>, ids: Vec<ego_tree::NodeId>) -> Vec<ego_tree::NodeId> {
    let set: std::collections::HashSet<_> = ids.iter().copied().collect();
    ids.into_iter()
        .filter(|id| {
            let mut ancestors = tree.get(*id).unwrap().ancestors();
            !ancestors.any(|a| set.contains(&a.id()))
        })
        .collect()
}

fn collect_grid_whitelist(document: &Html) -> std::collections::HashSet<ego_tree::NodeId> {
    let mut whitelist = std::collections::HashSet::new();
    let any = Selector::parse("*").unwrap();
    for container in document.select(&any) {
        let children: Vec<_> = container.children().filter_map(scraper::ElementRef::wrap).collect();
        if children.len() < 3 {
            continue;
        }
        let tags: Vec<&str> = children.iter().map(|c| c.value().name()).collect();
        let densities: Vec<f64> = children
            .iter()
            .map(|c| {
                let text_len = c.text().collect::<String>().trim().len().max(1);
                let link_len: usize = c
                    .select(&Selector::parse("a").unwrap())
                    .map(|a| a.text().collect::<String>().len())
                    .sum();
                link_len as f64 / text_len as f64
            })
            .collect();
        if is_grid_candidate(&tags, &densities) {
            for c in &children {
                whitelist.insert(c.id());
            }
        }
    }
    whitelist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx() -> ElementContext<'static> {
        ElementContext {
            tag: "div",
            schema: SchemaName::Generic,
            ..Default::default()
        }
    }

    #[test]
    fn role_navigation_is_zero_weight() {
        let ctx = ElementContext { role: Some("navigation"), ..base_ctx() };
        let (w, reason) = compute_weight(&ctx);
        assert_eq!(w, 0.0);
        assert_eq!(reason, "role=navigation");
    }

    #[test]
    fn government_contentinfo_gets_exception_weight() {
        let ctx = ElementContext {
            role: Some("contentinfo"),
            schema: SchemaName::GovernmentPage,
            ..base_ctx()
        };
        let (w, reason) = compute_weight(&ctx);
        assert_eq!(w, 0.6);
        assert_eq!(reason, "footer-gov-exception");
    }

    #[test]
    fn complementary_with_form_controls_is_filter_sidebar() {
        let ctx = ElementContext {
            role: Some("complementary"),
            has_visible_form_controls: true,
            ..base_ctx()
        };
        assert_eq!(compute_weight(&ctx), (0.7, "filter-sidebar".to_string()));
    }

    #[test]
    fn aria_hidden_wins_over_default() {
        let ctx = ElementContext { aria_hidden: true, ..base_ctx() };
        assert_eq!(compute_weight(&ctx).0, 0.0);
    }

    #[test]
    fn noise_classes_with_no_content_match_score_low() {
        let ctx = ElementContext {
            class_and_id: "sidebar promo-box",
            ..base_ctx()
        };
        let (w, reason) = compute_weight(&ctx);
        assert_eq!(w, 0.2);
        assert!(reason.starts_with("noise-pattern"));
    }

    #[test]
    fn noise_classes_with_content_match_is_override() {
        let ctx = ElementContext {
            class_and_id: "sidebar related article-content",
            ..base_ctx()
        };
        let (w, _) = compute_weight(&ctx);
        assert_eq!(w, 0.7);
    }

    #[test]
    fn high_link_density_block_is_penalized() {
        let ctx = ElementContext {
            tag: "div",
            text_len: 100,
            link_text_len: 90,
            ..base_ctx()
        };
        let (w, reason) = compute_weight(&ctx);
        assert_eq!(w, 0.2);
        assert!(reason.starts_with("link-density-high"));
    }

    #[test]
    fn short_text_is_not_penalized_for_link_density() {
        let ctx = ElementContext {
            tag: "div",
            text_len: 10,
            link_text_len: 10,
            ..base_ctx()
        };
        assert_eq!(compute_weight(&ctx), (1.0, "default".to_string()));
    }

    #[test]
    fn default_weight_is_one() {
        assert_eq!(compute_weight(&base_ctx()), (1.0, "default".to_string()));
    }

    #[test]
    fn region_mapping_covers_expected_reasons() {
        assert_eq!(region_for_removal_reason("semantic-nav"), Some("navigation"));
        assert_eq!(region_for_removal_reason("role=banner"), Some("header"));
        assert_eq!(region_for_removal_reason("role=contentinfo"), Some("footer"));
        assert_eq!(region_for_removal_reason("semantic-aside"), Some("complementary"));
        assert_eq!(region_for_removal_reason("noise-pattern(2)"), None);
    }

    #[test]
    fn grid_candidate_requires_similar_siblings_and_link_density() {
        assert!(is_grid_candidate(&["li", "li", "li", "li"], &[0.5, 0.6, 0.4, 0.7]));
        assert!(!is_grid_candidate(&["li", "div", "p"], &[0.9, 0.9, 0.9]));
        assert!(!is_grid_candidate(&["li", "li", "li"], &[0.1, 0.0, 0.05]));
    }
}
