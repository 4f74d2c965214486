//! The `BrowserSession` capability trait and its two concrete
//! constructors: one backed by a pooled `chromiumoxide` page, one a
//! deterministic in-memory fake for tests. Modeling session ownership as
//! two distinct constructors (rather than a boolean `_owns_browser` flag
//! threaded through one type) keeps stop-behavior explicit in the type
//! instead of in a runtime branch.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::accessibility::GetFullAxTreeParams;
use chromiumoxide::{Browser, Page};
use pagemap_domain::ax::{AxTreeSource, RawAxNode};
use pagemap_domain::model::{DialogKind, DialogRecord};
use pagemap_domain::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::dialog::DialogBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavStrategy {
    NetworkIdle,
    Load,
    Hybrid,
}

/// The capability set every session must provide, independent of whether
/// it came from the pool or was created standalone. One production impl
/// (`ChromiumSession`), one test fake (`FakeSession`).
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str, strategy: NavStrategy, networkidle_budget_ms: u64) -> Result<String>;
    async fn current_url(&self) -> Result<String>;
    async fn title(&self) -> Result<String>;
    async fn html(&self) -> Result<String>;
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;
    fn drain_dialogs(&self) -> Vec<DialogRecord>;
    async fn is_alive(&self) -> bool;
    async fn tab_count(&self) -> usize;
    async fn go_back(&self) -> Result<bool>;
    /// Close this session's resources. Pooled sessions close only their
    /// context; standalone sessions additionally close the browser and
    /// driver — the distinction is encoded in the constructor, not here.
    async fn stop(&self);
}

/// A session backed by one `chromiumoxide` page within a context created
/// from a shared `Browser`.
pub struct ChromiumSession {
    page: Page,
    dialogs: Arc<DialogBuffer>,
    owns_browser: Option<Arc<tokio::sync::Mutex<Option<Browser>>>>,
}

impl ChromiumSession {
    /// Construct a session borrowed from the pool. `stop` closes only the
    /// page/context; the shared browser is left running.
    pub fn from_pool(page: Page, max_dialog_buffer: usize) -> Self {
        Self {
            page,
            dialogs: Arc::new(DialogBuffer::new(max_dialog_buffer)),
            owns_browser: None,
        }
    }

    /// Construct a standalone session (used by `build --offline`-adjacent
    /// one-shot tooling, not by the pooled session manager). `stop` closes
    /// the page, the browser, and the driver process.
    pub fn standalone(page: Page, browser: Browser, max_dialog_buffer: usize) -> Self {
        Self {
            page,
            dialogs: Arc::new(DialogBuffer::new(max_dialog_buffer)),
            owns_browser: Some(Arc::new(tokio::sync::Mutex::new(Some(browser)))),
        }
    }

    /// Record a dialog observed by the page's event stream, applying the
    /// fixed per-kind auto-action.
    pub fn record_dialog(&self, kind: DialogKind, message: String) {
        let dismissed = !crate::dialog::auto_action(kind);
        self.dialogs.push(DialogRecord { kind, message, dismissed });
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str, strategy: NavStrategy, networkidle_budget_ms: u64) -> Result<String> {
        self.page
            .goto(url)
            .await
            .map_err(|e| Error::BrowserDead(e.to_string()))?;

        match strategy {
            NavStrategy::Load => {
                self.page
                    .wait_for_navigation()
                    .await
                    .map_err(|e| Error::BrowserDead(e.to_string()))?;
                Ok("load".to_string())
            }
            NavStrategy::NetworkIdle => {
                wait_for_network_idle(&self.page, Duration::from_millis(networkidle_budget_ms * 4)).await?;
                Ok("networkidle".to_string())
            }
            NavStrategy::Hybrid => {
                self.page
                    .wait_for_navigation()
                    .await
                    .map_err(|e| Error::BrowserDead(e.to_string()))?;
                match tokio::time::timeout(
                    Duration::from_millis(networkidle_budget_ms),
                    wait_for_network_idle(&self.page, Duration::from_millis(networkidle_budget_ms)),
                )
                .await
                {
                    Ok(Ok(())) => Ok("hybrid".to_string()),
                    _ => Ok("load+settle".to_string()),
                }
            }
        }
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map_err(|e| Error::BrowserDead(e.to_string()))?
            .ok_or_else(|| Error::Unexpected("page has no URL".into()))
    }

    async fn title(&self) -> Result<String> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(|e| Error::BrowserDead(e.to_string()))?
            .unwrap_or_default())
    }

    async fn html(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| Error::BrowserDead(e.to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| Error::BrowserDead(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| Error::Unexpected(format!("evaluate result was not JSON: {e}")))
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        use chromiumoxide::page::ScreenshotParams;
        let params = ScreenshotParams::builder().full_page(full_page).build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| Error::BrowserDead(e.to_string()))
    }

    fn drain_dialogs(&self) -> Vec<DialogRecord> {
        self.dialogs.drain()
    }

    async fn is_alive(&self) -> bool {
        self.page.evaluate("1").await.is_ok()
    }

    async fn tab_count(&self) -> usize {
        match self.page.pages().await {
            Ok(pages) => pages.len(),
            Err(_) => 0,
        }
    }

    async fn go_back(&self) -> Result<bool> {
        let had_history = self
            .page
            .evaluate("window.history.length > 1")
            .await
            .ok()
            .and_then(|v| v.into_value::<bool>().ok())
            .unwrap_or(false);
        if had_history {
            self.page
                .evaluate("window.history.back()")
                .await
                .map_err(|e| Error::BrowserDead(e.to_string()))?;
        }
        Ok(had_history)
    }

    async fn stop(&self) {
        let _ = self.page.close().await;
        if let Some(browser) = &self.owns_browser {
            if let Some(mut b) = browser.lock().await.take() {
                let _ = b.close().await;
                let _ = b.wait().await;
            }
        }
    }
}

#[async_trait]
impl AxTreeSource for ChromiumSession {
    async fn fetch_ax_tree(&self) -> Result<Vec<RawAxNode>> {
        let tree = self
            .page
            .execute(GetFullAxTreeParams::default())
            .await
            .map_err(|e| Error::BrowserDead(format!("getFullAXTree failed: {e}")))?;

        Ok(tree
            .result
            .nodes
            .iter()
            .map(|n| RawAxNode {
                id: n.node_id.inner().to_string(),
                role: n.role.as_ref().and_then(|r| r.value.as_str()).unwrap_or("").to_string(),
                name: n.name.as_ref().and_then(|v| v.value.as_str()).unwrap_or("").to_string(),
                value: n.value.as_ref().and_then(|v| v.value.as_str()).map(|s| s.to_string()),
                child_ids: n
                    .child_ids
                    .as_ref()
                    .map(|ids| ids.iter().map(|id| id.inner().to_string()).collect())
                    .unwrap_or_default(),
                ignored: n.ignored,
            })
            .collect())
    }
}

async fn wait_for_network_idle(page: &Page, budget: Duration) -> Result<()> {
    // chromiumoxide exposes navigation lifecycle events; a minimal
    // quiet-window poll is sufficient here since the hybrid strategy
    // already has its own outer deadline.
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if tokio::time::Instant::now() >= deadline {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        if page.evaluate("document.readyState === 'complete'").await.is_ok() {
            return Ok(());
        }
    }
}

/// A deterministic in-memory fake used by unit tests for the session
/// manager, action executor, and DOM-change detector.
#[cfg(any(test, feature = "test-fake"))]
pub struct FakeSession {
    pub url: parking_lot::Mutex<String>,
    pub title_value: parking_lot::Mutex<String>,
    pub html_value: parking_lot::Mutex<String>,
    pub alive: std::sync::atomic::AtomicBool,
    pub tabs: std::sync::atomic::AtomicUsize,
    pub dialogs: Arc<DialogBuffer>,
    pub history: parking_lot::Mutex<Vec<String>>,
    pub ax_nodes: parking_lot::Mutex<Vec<pagemap_domain::ax::RawAxNode>>,
    pub last_script: parking_lot::Mutex<Option<String>>,
}

#[cfg(any(test, feature = "test-fake"))]
impl FakeSession {
    pub fn new(url: &str) -> Self {
        Self {
            url: parking_lot::Mutex::new(url.to_string()),
            title_value: parking_lot::Mutex::new(String::new()),
            html_value: parking_lot::Mutex::new(String::new()),
            alive: std::sync::atomic::AtomicBool::new(true),
            tabs: std::sync::atomic::AtomicUsize::new(1),
            dialogs: Arc::new(DialogBuffer::new(32)),
            history: parking_lot::Mutex::new(vec![url.to_string()]),
            ax_nodes: parking_lot::Mutex::new(Vec::new()),
            last_script: parking_lot::Mutex::new(None),
        }
    }

    /// Seed the tree `fetch_ax_tree` will return, for detector tests.
    pub fn with_ax_tree(self, nodes: Vec<pagemap_domain::ax::RawAxNode>) -> Self {
        *self.ax_nodes.lock() = nodes;
        self
    }
}

#[cfg(any(test, feature = "test-fake"))]
#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str, _strategy: NavStrategy, _budget_ms: u64) -> Result<String> {
        *self.url.lock() = url.to_string();
        self.history.lock().push(url.to_string());
        Ok("load".to_string())
    }
    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().clone())
    }
    async fn title(&self) -> Result<String> {
        Ok(self.title_value.lock().clone())
    }
    async fn html(&self) -> Result<String> {
        Ok(self.html_value.lock().clone())
    }
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        *self.last_script.lock() = Some(script.to_string());
        Ok(serde_json::Value::Null)
    }
    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
    fn drain_dialogs(&self) -> Vec<DialogRecord> {
        self.dialogs.drain()
    }
    async fn is_alive(&self) -> bool {
        self.alive.load(std::sync::atomic::Ordering::SeqCst)
    }
    async fn tab_count(&self) -> usize {
        self.tabs.load(std::sync::atomic::Ordering::SeqCst)
    }
    async fn go_back(&self) -> Result<bool> {
        let mut hist = self.history.lock();
        if hist.len() > 1 {
            hist.pop();
            *self.url.lock() = hist.last().cloned().unwrap_or_default();
            Ok(true)
        } else {
            Ok(false)
        }
    }
    async fn stop(&self) {
        self.alive.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-fake"))]
#[async_trait]
impl AxTreeSource for FakeSession {
    async fn fetch_ax_tree(&self) -> Result<Vec<RawAxNode>> {
        Ok(self.ax_nodes.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_session_navigation_updates_url_and_history() {
        let session = FakeSession::new("https://a.com");
        session.navigate("https://b.com", NavStrategy::Load, 0).await.unwrap();
        assert_eq!(session.current_url().await.unwrap(), "https://b.com");
        assert!(session.go_back().await.unwrap());
        assert_eq!(session.current_url().await.unwrap(), "https://a.com");
        assert!(!session.go_back().await.unwrap());
    }
}
