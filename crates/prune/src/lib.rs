//! HTML pruning pipeline: AOM pre-filter → chunk decomposition →
//! kept/removed selection → re-merge/compression → pruned-context
//! building, per §4.8–§4.9.

pub mod aom;
pub mod budget;
pub mod builder;
pub mod chunk;
pub mod compress;
pub mod script_filter;
pub mod select;

use pagemap_domain::model::{Interactable, PageType, SchemaName};

pub struct PipelineOutput {
    pub pruned_context: String,
    pub pruned_tokens: u32,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
    pub removal_reasons: std::collections::HashMap<String, u32>,
    /// The locale/CJK-multiplied total token budget (`base_total_budget *
    /// multiplier`), also surfaced as `metadata["_total_budget"]`.
    pub total_budget: u32,
}

/// Run the full pruning pipeline end to end: AOM filter, decomposition,
/// kept/removed selection, re-merge + compression, token-budget-aware
/// context building.
pub fn run_pipeline(
    raw_html: &str,
    page_type: PageType,
    schema_name: SchemaName,
    locale: &str,
    interactables: &[Interactable],
    aom_threshold: f64,
    base_pruned_budget: u32,
    base_total_budget: u32,
) -> PipelineOutput {
    let aom_result = aom::filter(raw_html, aom_threshold, schema_name);
    let (chunks, has_main) = chunk::decompose(&aom_result.html);
    let decided = select::prune_chunks(chunks, schema_name, has_main);

    let kept: Vec<_> = decided.into_iter().filter_map(|(c, r)| r.map(|reason| (c, reason))).collect();
    let merged = compress::remerge(kept);
    let compressed = compress::compress(&merged);

    let (pruned_budget, total_budget, _multiplier, _cjk_ratio) =
        budget::compute_token_budget(locale, Some(raw_html), base_pruned_budget, base_total_budget);

    let built = builder::build(&compressed, Some(raw_html), page_type, schema_name, pruned_budget, locale, interactables);

    let mut metadata = built.metadata;
    metadata.insert("_total_budget".to_string(), serde_json::Value::from(total_budget));

    PipelineOutput {
        pruned_context: built.context,
        pruned_tokens: built.tokens,
        metadata,
        removal_reasons: aom_result.removal_reasons,
        total_budget,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_budget_is_locale_multiplied_and_surfaced_in_metadata() {
        let html = "<html><body><main><p>hello</p></main></body></html>";
        let en = run_pipeline(html, PageType::Article, SchemaName::Generic, "en", &[], 0.5, 1500, 4000);
        let ko = run_pipeline(html, PageType::Article, SchemaName::Generic, "ko", &[], 0.5, 1500, 4000);

        assert!(ko.total_budget > en.total_budget);
        assert_eq!(en.metadata.get("_total_budget"), Some(&serde_json::Value::from(en.total_budget)));
        assert_eq!(ko.metadata.get("_total_budget"), Some(&serde_json::Value::from(ko.total_budget)));
    }
}
