//! Live page-map assembler (§4.10): navigate, settle, detect, prune,
//! budget-filter interactables, and classify — against a real browser
//! session.

use std::time::{Duration, Instant};

use pagemap_browser::{AxTreeSource, BrowserSession, NavStrategy};
use pagemap_domain::config::{BrowserConfig, PruneConfig};
use pagemap_domain::model::{Interactable, PageMap, Tier};
use pagemap_domain::Result;
use scraper::Html;
use tracing::warn;

use crate::classify::classify;
use crate::extraction;
use crate::offline::{apply_blocked_classification, extract_images};

/// Build a fresh `PageMap` for the session's current page (or after
/// navigating to `url` first, when given).
pub async fn build_page_map_live(
    session: &(dyn BrowserSession),
    ax_source: &(dyn AxTreeSource),
    url: Option<&str>,
    browser_cfg: &BrowserConfig,
    prune_cfg: &PruneConfig,
    locale: &str,
) -> Result<PageMap> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    if let Some(url) = url {
        session.navigate(url, NavStrategy::Hybrid, browser_cfg.networkidle_budget_ms).await?;
    }

    settle(session, browser_cfg).await;

    let current_url = session.current_url().await?;
    let title = session.title().await?;

    let (mut interactables, detect_warnings) = pagemap_detect::detect_interactables(ax_source).await;
    warnings.extend(detect_warnings);

    let raw_html = session.html().await?;
    let (page_type, schema) = classify(&current_url, &raw_html, &title);

    let output = pagemap_prune::run_pipeline(
        &raw_html,
        page_type,
        schema,
        locale,
        &interactables,
        prune_cfg.aom_threshold,
        prune_cfg.base_pruned_budget,
        prune_cfg.base_total_budget,
    );

    let overhead = 50u32;
    let available = (output.total_budget as i64 - output.pruned_tokens as i64 - overhead as i64)
        .max(prune_cfg.min_interactable_budget as i64) as u32;
    filter_interactables_to_budget(&mut interactables, available, &mut warnings);
    renumber_refs(&mut interactables);

    let mut metadata = output.metadata;
    metadata.insert("schema_name".to_string(), serde_json::to_value(schema).unwrap());
    metadata.insert("mode".to_string(), serde_json::Value::String("live".to_string()));
    if let Some(extracted) = extraction::extract(&raw_html, schema) {
        metadata.insert("schema_extraction".to_string(), serde_json::to_value(extracted).unwrap());
    }

    let document = Html::parse_document(&raw_html);
    let images = extract_images(&document, &current_url);

    let (page_type, metadata) = apply_blocked_classification(page_type, &raw_html, &title, None, metadata, &mut warnings);

    Ok(PageMap {
        url: current_url,
        title,
        page_type,
        interactables,
        pruned_context: output.pruned_context,
        pruned_tokens: output.pruned_tokens,
        generation_ms: start.elapsed().as_secs_f64() * 1000.0,
        images,
        metadata,
        warnings,
    })
}

/// Wait for the in-page DOM to go quiet for `settle_quiet_ms`, or give up
/// after `settle_max_ms`. A `MutationObserver`-backed promise does the
/// actual waiting in-page; failures here are non-fatal (§4.10 step 2).
async fn settle(session: &dyn BrowserSession, cfg: &BrowserConfig) {
    let script = format!(
        r#"new Promise((resolve) => {{
  let timer = null;
  const done = () => {{ observer.disconnect(); resolve(true); }};
  const observer = new MutationObserver(() => {{
    clearTimeout(timer);
    timer = setTimeout(done, {quiet});
  }});
  observer.observe(document.body, {{ childList: true, subtree: true, attributes: true }});
  timer = setTimeout(done, {quiet});
  setTimeout(done, {max});
}})"#,
        quiet = cfg.settle_quiet_ms,
        max = cfg.settle_max_ms,
    );

    let budget = Duration::from_millis(cfg.settle_max_ms + 250);
    if tokio::time::timeout(budget, session.evaluate(&script)).await.is_err() {
        warn!("page settle timed out past its hard cap");
    }
}

/// Five-bucket priority filter (§4.10 step 6): drop lowest priority first
/// until the tokenized interactable list fits `budget` tokens. Bucket
/// order, highest priority first: named tier-1 elements in the main
/// region, typed/select affordances anywhere, named tier-1 elements
/// outside the main region, everything else.
fn filter_interactables_to_budget(interactables: &mut Vec<Interactable>, budget: u32, warnings: &mut Vec<String>) {
    let mut current_tokens = estimate_tokens(interactables);
    if current_tokens <= budget {
        return;
    }

    let mut dropped = 0usize;
    for bucket in [Bucket::Rest, Bucket::NonMainNamed, Bucket::TypedOrSelect, Bucket::MainNamed] {
        while current_tokens > budget {
            let Some(idx) = interactables.iter().position(|i| bucket_of(i) == bucket) else {
                break;
            };
            let removed = interactables.remove(idx);
            current_tokens -= estimate_tokens(std::slice::from_ref(&removed));
            dropped += 1;
        }
        if current_tokens <= budget {
            break;
        }
    }

    if dropped > 0 {
        warnings.push(format!(
            "dropped {dropped} lowest-priority interactables to fit the token budget"
        ));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    MainNamed,
    TypedOrSelect,
    NonMainNamed,
    Rest,
}

fn bucket_of(i: &Interactable) -> Bucket {
    use pagemap_domain::model::{Affordance, Region};
    if matches!(i.affordance, Affordance::Type | Affordance::Select) {
        return Bucket::TypedOrSelect;
    }
    if i.tier == Tier::Named && i.region == Region::Main {
        return Bucket::MainNamed;
    }
    if i.tier == Tier::Named {
        return Bucket::NonMainNamed;
    }
    Bucket::Rest
}

fn estimate_tokens(items: &[Interactable]) -> u32 {
    items
        .iter()
        .map(|i| pagemap_prune::budget::count_tokens(&format!("{} {} {}", i.role, i.name, i.options.join(" "))) as u32)
        .sum()
}

fn renumber_refs(interactables: &mut [Interactable]) {
    for (idx, item) in interactables.iter_mut().enumerate() {
        item.r#ref = idx as u32 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemap_domain::model::{Affordance, Region};

    fn item(r#ref: u32, tier: Tier, region: Region, affordance: Affordance) -> Interactable {
        Interactable {
            r#ref,
            role: "button".into(),
            name: "x".repeat(50),
            affordance,
            region,
            tier,
            value: None,
            options: vec![],
            selector: None,
        }
    }

    #[test]
    fn renumber_produces_contiguous_refs() {
        let mut items = vec![item(5, Tier::Named, Region::Main, Affordance::Click), item(9, Tier::Named, Region::Main, Affordance::Click)];
        renumber_refs(&mut items);
        assert_eq!(items[0].r#ref, 1);
        assert_eq!(items[1].r#ref, 2);
    }

    #[test]
    fn budget_filter_drops_rest_bucket_before_main_named() {
        let mut items = vec![
            item(1, Tier::Named, Region::Main, Affordance::Click),
            item(2, Tier::Unnamed, Region::Footer, Affordance::Click),
        ];
        let mut warnings = Vec::new();
        filter_interactables_to_budget(&mut items, 1, &mut warnings);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].region, Region::Main);
        assert!(!warnings.is_empty());
    }

    #[test]
    fn budget_filter_noop_when_already_within_budget() {
        let mut items = vec![item(1, Tier::Named, Region::Main, Affordance::Click)];
        let mut warnings = Vec::new();
        filter_interactables_to_budget(&mut items, 10_000, &mut warnings);
        assert_eq!(items.len(), 1);
        assert!(warnings.is_empty());
    }
}
