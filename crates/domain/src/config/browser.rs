use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Browser pool & session lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Semaphore size bounding concurrent browsing contexts.
    #[serde(default = "d_max_contexts")]
    pub max_contexts: usize,
    #[serde(default = "d_max_navigations")]
    pub max_navigations: u64,
    #[serde(default = "d_max_session_age")]
    pub max_session_age_secs: u64,
    #[serde(default = "d_max_tabs")]
    pub max_tabs_per_session: usize,
    #[serde(default = "d_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default = "d_settle_quiet_ms")]
    pub settle_quiet_ms: u64,
    #[serde(default = "d_settle_max_ms")]
    pub settle_max_ms: u64,
    #[serde(default = "d_networkidle_budget_ms")]
    pub networkidle_budget_ms: u64,
    #[serde(default = "d_max_dialog_buffer")]
    pub max_dialog_buffer: usize,
    #[serde(default = "d_tool_lock_timeout")]
    pub tool_lock_timeout_secs: u64,
    #[serde(default = "d_pipeline_timeout")]
    pub pipeline_timeout_secs: u64,
    #[serde(default = "d_screenshot_timeout")]
    pub screenshot_timeout_secs: u64,
    #[serde(default = "d_navigate_back_timeout")]
    pub navigate_back_timeout_secs: u64,
    #[serde(default = "d_batch_concurrency")]
    pub batch_max_concurrency: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            max_contexts: d_max_contexts(),
            max_navigations: d_max_navigations(),
            max_session_age_secs: d_max_session_age(),
            max_tabs_per_session: d_max_tabs(),
            session_ttl_secs: d_session_ttl(),
            settle_quiet_ms: d_settle_quiet_ms(),
            settle_max_ms: d_settle_max_ms(),
            networkidle_budget_ms: d_networkidle_budget_ms(),
            max_dialog_buffer: d_max_dialog_buffer(),
            tool_lock_timeout_secs: d_tool_lock_timeout(),
            pipeline_timeout_secs: d_pipeline_timeout(),
            screenshot_timeout_secs: d_screenshot_timeout(),
            navigate_back_timeout_secs: d_navigate_back_timeout(),
            batch_max_concurrency: d_batch_concurrency(),
        }
    }
}

fn d_max_contexts() -> usize {
    8
}
fn d_max_navigations() -> u64 {
    500
}
fn d_max_session_age() -> u64 {
    900
}
fn d_max_tabs() -> usize {
    10
}
fn d_session_ttl() -> u64 {
    1_800
}
fn d_settle_quiet_ms() -> u64 {
    200
}
fn d_settle_max_ms() -> u64 {
    3_000
}
fn d_networkidle_budget_ms() -> u64 {
    2_000
}
fn d_max_dialog_buffer() -> usize {
    32
}
fn d_tool_lock_timeout() -> u64 {
    5
}
fn d_pipeline_timeout() -> u64 {
    45
}
fn d_screenshot_timeout() -> u64 {
    15
}
fn d_navigate_back_timeout() -> u64 {
    30
}
fn d_batch_concurrency() -> usize {
    10
}
