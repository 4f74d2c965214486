use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTML pruning & pruned-context token budget
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneConfig {
    /// AOM weight cutoff; elements scoring below are removed with their
    /// descendants.
    #[serde(default = "d_aom_threshold")]
    pub aom_threshold: f64,
    #[serde(default = "d_base_pruned_budget")]
    pub base_pruned_budget: u32,
    #[serde(default = "d_base_total_budget")]
    pub base_total_budget: u32,
    /// Minimum interactable budget after subtracting pruned-context tokens
    /// and per-tool overhead.
    #[serde(default = "d_min_interactable_budget")]
    pub min_interactable_budget: u32,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            aom_threshold: d_aom_threshold(),
            base_pruned_budget: d_base_pruned_budget(),
            base_total_budget: d_base_total_budget(),
            min_interactable_budget: d_min_interactable_budget(),
        }
    }
}

fn d_aom_threshold() -> f64 {
    0.5
}
fn d_base_pruned_budget() -> u32 {
    1_500
}
fn d_base_total_budget() -> u32 {
    5_000
}
fn d_min_interactable_budget() -> u32 {
    100
}
