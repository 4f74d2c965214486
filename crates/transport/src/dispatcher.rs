//! The abstract tool contract the gateway implements. Keeping this trait
//! here (rather than the concrete browser/prune/action wiring) lets the
//! transport crate stay ignorant of how a page map is actually built.

use async_trait::async_trait;

/// Raw PNG bytes plus an optional accompanying text note, the two content
/// items `take_screenshot` returns per §6.1.
pub struct ScreenshotOutput {
    pub png: Option<Vec<u8>>,
    pub text: String,
}

/// The five tools exposed over MCP (§6.1). Every method already returns
/// the exact text payload the wire format wants — JSON objects are
/// pre-serialized by the gateway, which owns the domain types.
#[async_trait]
pub trait PageMapTools: Send + Sync + 'static {
    async fn get_page_map(&self, url: Option<String>) -> String;
    async fn execute_action(&self, r#ref: u32, action: String, value: Option<String>) -> String;
    async fn navigate_back(&self) -> String;
    async fn take_screenshot(&self, full_page: bool) -> ScreenshotOutput;
    async fn batch_get_page_map(&self, urls: Vec<String>, concurrency: usize) -> String;
}

/// Liveness/readiness state the HTTP health probes read (§6.2, §4.14).
pub trait HealthProbe: Send + Sync + 'static {
    fn browser_connected(&self) -> bool;
    fn is_draining(&self) -> bool;
    fn pool_connected_at_least_once(&self) -> bool;
}
