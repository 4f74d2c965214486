//! `PageMapTools`/`HealthProbe` implementation (§4.14): wires the session
//! manager, robots checker, and security guardrails around the
//! assembler/action-executor primitives.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pagemap_browser::SessionManager;
use pagemap_domain::config::Config;
use pagemap_domain::model::ActionKind;
use pagemap_security::guards::{check_screenshot_size, response_size_guard};
use pagemap_security::robots::RobotsChecker;
use pagemap_security::url_validator::{system_resolve, validate_url, validate_url_with_dns};
use pagemap_transport::{HealthProbe, PageMapTools, ScreenshotOutput};
use tracing::warn;

use crate::assembler::build_page_map_live;
use crate::output::render_text;

/// This server runs one implicit session per process; every tool call
/// resolves against this fixed key rather than a transport-supplied id.
const SESSION_KEY: &str = "default";

pub struct PageMapToolsImpl {
    sessions: Arc<SessionManager>,
    robots: Arc<RobotsChecker>,
    config: Arc<Config>,
    browser_connected: AtomicBool,
    is_draining: AtomicBool,
    pool_connected_at_least_once: AtomicBool,
}

impl PageMapToolsImpl {
    pub fn new(sessions: Arc<SessionManager>, robots: Arc<RobotsChecker>, config: Arc<Config>) -> Self {
        Self {
            sessions,
            robots,
            config,
            browser_connected: AtomicBool::new(false),
            is_draining: AtomicBool::new(false),
            pool_connected_at_least_once: AtomicBool::new(false),
        }
    }

    pub fn mark_browser_connected(&self) {
        self.browser_connected.store(true, Ordering::SeqCst);
        self.pool_connected_at_least_once.store(true, Ordering::SeqCst);
    }

    pub fn mark_browser_disconnected(&self) {
        self.browser_connected.store(false, Ordering::SeqCst);
    }

    pub fn start_draining(&self) {
        self.is_draining.store(true, Ordering::SeqCst);
    }

    async fn validate_and_check_robots(&self, url: &str) -> Result<(), String> {
        if let Some(reason) = validate_url(url, self.config.security.allow_local) {
            return Err(format!("{{\"error\": \"blocked: {reason}\"}}"));
        }
        if !self.config.robots.ignore_robots {
            let user_agent = self.config.security.effective_user_agent();
            if !self.robots.is_allowed(url, &user_agent).await {
                return Err(format!("{{\"error\": \"robots.txt disallows {url}\"}}"));
            }
        }
        Ok(())
    }
}

fn error_json(message: &str) -> String {
    serde_json::json!({"error": message}).to_string()
}

#[async_trait]
impl PageMapTools for PageMapToolsImpl {
    async fn get_page_map(&self, url: Option<String>) -> String {
        let _permit = match self.sessions.acquire_lock(SESSION_KEY).await {
            Ok(p) => p,
            Err(busy) => return busy.to_string(),
        };

        if let Some(ref url) = url {
            if let Err(err) = self.validate_and_check_robots(url).await {
                return err;
            }
        }

        let session = match self.sessions.get_or_create(SESSION_KEY).await {
            Ok(s) => s,
            Err(e) => return error_json(&e.sanitized_message()),
        };

        let page_map = match build_page_map_live(
            session.as_ref(),
            session.as_ref(),
            url.as_deref(),
            &self.config.browser,
            &self.config.prune,
            "en",
        )
        .await
        {
            Ok(m) => m,
            Err(e) => return error_json(&e.sanitized_message()),
        };

        if url.is_some() {
            self.sessions.record_navigation(SESSION_KEY).await;
        }

        let text = render_text(&page_map);
        let (bounded, truncated) = response_size_guard(&text, self.config.security.response_size_limit_bytes, "get_page_map");
        if truncated {
            warn!("get_page_map response truncated to fit the size guard");
        }

        self.sessions.with_cache(SESSION_KEY, |cache| cache.store(page_map));
        bounded
    }

    async fn execute_action(&self, r#ref: u32, action: String, value: Option<String>) -> String {
        let _permit = match self.sessions.acquire_lock(SESSION_KEY).await {
            Ok(p) => p,
            Err(busy) => return busy.to_string(),
        };

        let kind = match ActionKind::from_str(&action) {
            Ok(k) => k,
            Err(e) => return error_json(&e),
        };

        let session = match self.sessions.get_or_create(SESSION_KEY).await {
            Ok(s) => s,
            Err(e) => return error_json(&e.sanitized_message()),
        };

        let page_map = match self.sessions.with_cache(SESSION_KEY, |cache| cache.active().cloned()) {
            Some(Some(map)) => map,
            _ => return error_json("No active Page Map; call get_page_map first"),
        };

        let outcome = match pagemap_actions::execute_action(session.as_ref(), &page_map, r#ref, kind, value.as_deref()).await {
            Ok(o) => o,
            Err(e) => return error_json(&e.sanitized_message()),
        };

        if outcome.refs_expired {
            self.sessions.with_cache(SESSION_KEY, |cache| cache.invalidate_active());
        }

        serde_json::json!({
            "description": outcome.description,
            "current_url": outcome.current_url,
            "dom_change": outcome.change.as_str(),
            "refs_expired": outcome.refs_expired,
            "dialogs": outcome.dialogs,
        })
        .to_string()
    }

    async fn navigate_back(&self) -> String {
        let _permit = match self.sessions.acquire_lock(SESSION_KEY).await {
            Ok(p) => p,
            Err(busy) => return busy.to_string(),
        };

        let session = match self.sessions.get_or_create(SESSION_KEY).await {
            Ok(s) => s,
            Err(e) => return error_json(&e.sanitized_message()),
        };

        let had_history = match session.go_back().await {
            Ok(h) => h,
            Err(e) => return error_json(&e.sanitized_message()),
        };

        if !had_history {
            return serde_json::json!({"went_back": false}).to_string();
        }

        let resolved_url = match session.current_url().await {
            Ok(u) => u,
            Err(e) => return error_json(&e.sanitized_message()),
        };

        if let Some(reason) =
            validate_url_with_dns(&resolved_url, self.config.security.allow_local, system_resolve).await
        {
            warn!(url = %resolved_url, reason, "navigate_back landed on a now-disallowed address, returning to blank");
            let _ = session.navigate("about:blank", pagemap_browser::NavStrategy::Load, 0).await;
            self.sessions.with_cache(SESSION_KEY, |cache| cache.invalidate_active());
            return error_json(&format!("navigation blocked after the fact: {reason}"));
        }

        self.sessions.with_cache(SESSION_KEY, |cache| cache.invalidate_active());
        serde_json::json!({"went_back": true, "current_url": resolved_url}).to_string()
    }

    async fn take_screenshot(&self, full_page: bool) -> ScreenshotOutput {
        let _permit = match self.sessions.acquire_lock(SESSION_KEY).await {
            Ok(p) => p,
            Err(busy) => return ScreenshotOutput { png: None, text: busy.to_string() },
        };

        let session = match self.sessions.get_or_create(SESSION_KEY).await {
            Ok(s) => s,
            Err(e) => return ScreenshotOutput { png: None, text: error_json(&e.sanitized_message()) },
        };

        let bytes = match session.screenshot(full_page).await {
            Ok(b) => b,
            Err(e) => return ScreenshotOutput { png: None, text: error_json(&e.sanitized_message()) },
        };

        match check_screenshot_size(&bytes, self.config.security.screenshot_size_limit_bytes) {
            Ok(()) => ScreenshotOutput { png: Some(bytes), text: "ok".to_string() },
            Err(reason) => ScreenshotOutput { png: None, text: error_json(&reason) },
        }
    }

    async fn batch_get_page_map(&self, urls: Vec<String>, concurrency: usize) -> String {
        let concurrency = concurrency.clamp(1, self.config.browser.batch_max_concurrency);

        let mut deduped = Vec::new();
        for url in urls {
            if !deduped.contains(&url) {
                deduped.push(url);
            }
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency));
        let mut handles = Vec::new();
        for url in deduped {
            let semaphore = semaphore.clone();
            let sessions = self.sessions.clone();
            let browser_cfg = self.config.browser.clone();
            let prune_cfg = self.config.prune.clone();
            let allow_local = self.config.security.allow_local;
            let ignore_robots = self.config.robots.ignore_robots;
            let robots = self.robots.clone();
            let user_agent = self.config.security.effective_user_agent();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");

                if let Some(reason) = validate_url(&url, allow_local) {
                    return (url, Err(format!("blocked: {reason}")));
                }
                if !ignore_robots && !robots.is_allowed(&url, &user_agent).await {
                    return (url, Err("robots.txt disallows this URL".to_string()));
                }

                let (session, _session_permit) = match sessions.open_isolated().await {
                    Ok(s) => s,
                    Err(e) => return (url, Err(e.sanitized_message())),
                };

                let result = build_page_map_live(&session, &session, Some(&url), &browser_cfg, &prune_cfg, "en").await;
                session.stop().await;

                match result {
                    Ok(map) => {
                        sessions.with_cache(SESSION_KEY, |cache| cache.store_in_lru_only(map.clone()));
                        (url, Ok(map))
                    }
                    Err(e) => (url, Err(e.sanitized_message())),
                }
            }));
        }

        let mut results = Vec::new();
        let mut success = 0usize;
        let mut failed = 0usize;
        for handle in handles {
            match handle.await {
                Ok((url, Ok(map))) => {
                    success += 1;
                    results.push(serde_json::json!({"url": url, "status": "ok", "page_map": map}));
                }
                Ok((url, Err(reason))) => {
                    failed += 1;
                    results.push(serde_json::json!({"url": url, "status": "error", "error": reason}));
                }
                Err(join_err) => {
                    failed += 1;
                    results.push(serde_json::json!({"url": null, "status": "error", "error": join_err.to_string()}));
                }
            }
        }

        serde_json::json!({
            "summary": {"total": results.len(), "success": success, "failed": failed},
            "results": results,
        })
        .to_string()
    }
}

impl HealthProbe for PageMapToolsImpl {
    fn browser_connected(&self) -> bool {
        self.browser_connected.load(Ordering::SeqCst)
    }
    fn is_draining(&self) -> bool {
        self.is_draining.load(Ordering::SeqCst)
    }
    fn pool_connected_at_least_once(&self) -> bool {
        self.pool_connected_at_least_once.load(Ordering::SeqCst)
    }
}
