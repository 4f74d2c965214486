//! Render a `PageMap` into the formats agents and the `build` CLI
//! subcommand consume: the MCP tool text response, `--format json`, and
//! `--format markdown`.

use pagemap_domain::model::PageMap;
use pagemap_security::sanitize::{add_content_boundary, sanitize_text};

const MAX_NAME_LEN: usize = 200;
const MAX_PRUNED_CONTEXT_LEN: usize = 20_000;

/// The text block returned by `get_page_map`/`batch_get_page_map` and used
/// by `build --format text`: a numbered interactable list, the boundary-
/// wrapped pruned context, then any warnings.
pub fn render_text(page_map: &PageMap) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n", sanitize_text(&page_map.title, MAX_NAME_LEN)));
    out.push_str(&format!("URL: {}\n", page_map.url));
    out.push_str(&format!("Page type: {:?}\n\n", page_map.page_type));

    if !page_map.interactables.is_empty() {
        out.push_str("## Interactables\n");
        for i in &page_map.interactables {
            let name = sanitize_text(&i.name, MAX_NAME_LEN);
            let mut line = format!("[{}] {} \"{}\" ({:?})", i.r#ref, i.role, name, i.affordance);
            if !i.options.is_empty() {
                let opts: Vec<String> = i.options.iter().map(|o| sanitize_text(o, 80)).collect();
                line.push_str(&format!(" options: {}", opts.join(", ")));
            }
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str("## Page content\n");
    out.push_str(&add_content_boundary(&page_map.pruned_context, &page_map.url, MAX_PRUNED_CONTEXT_LEN));
    out.push('\n');

    if !page_map.warnings.is_empty() {
        out.push_str("\n## Warnings\n");
        for w in &page_map.warnings {
            out.push_str(&format!("- {}\n", sanitize_text(w, 300)));
        }
    }

    out
}

pub fn render_json(page_map: &PageMap) -> serde_json::Result<String> {
    serde_json::to_string_pretty(page_map)
}

pub fn render_markdown(page_map: &PageMap) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", sanitize_text(&page_map.title, MAX_NAME_LEN)));
    out.push_str(&format!("**URL:** {}  \n**Page type:** {:?}\n\n", page_map.url, page_map.page_type));

    if !page_map.interactables.is_empty() {
        out.push_str("## Interactables\n\n");
        out.push_str("| ref | role | name | affordance |\n|---|---|---|---|\n");
        for i in &page_map.interactables {
            out.push_str(&format!(
                "| {} | {} | {} | {:?} |\n",
                i.r#ref,
                i.role,
                sanitize_text(&i.name, MAX_NAME_LEN),
                i.affordance
            ));
        }
        out.push('\n');
    }

    out.push_str("## Page content\n\n");
    out.push_str(&page_map.pruned_context);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample() -> PageMap {
        PageMap {
            url: "https://example.com".into(),
            title: "Example".into(),
            page_type: pagemap_domain::model::PageType::Landing,
            interactables: vec![],
            pruned_context: "hello world".into(),
            pruned_tokens: 2,
            generation_ms: 1.0,
            images: vec![],
            metadata: HashMap::new(),
            warnings: vec!["something minor".into()],
        }
    }

    #[test]
    fn text_render_includes_boundary_and_warnings() {
        let text = render_text(&sample());
        assert!(text.contains("web_content_"));
        assert!(text.contains("something minor"));
    }

    #[test]
    fn json_render_round_trips_through_serde() {
        let json = render_json(&sample()).unwrap();
        let parsed: PageMap = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.url, "https://example.com");
    }
}
