//! Semaphore-bounded pool around a single shared `chromiumoxide::Browser`
//! process. The pool owns the browser and its contexts; sessions borrow a
//! page and release it back on drop.

use std::sync::Arc;

use chromiumoxide::{Browser, BrowserConfig as ChromeConfig};
use pagemap_domain::{Error, Result};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::session::ChromiumSession;

pub struct BrowserPool {
    browser: Arc<tokio::sync::Mutex<Browser>>,
    permits: Arc<Semaphore>,
    max_dialog_buffer: usize,
}

impl BrowserPool {
    /// Launch the shared browser process and size the pool's concurrency
    /// to `max_contexts` (§4.6).
    pub async fn launch(max_contexts: usize, max_dialog_buffer: usize) -> Result<(Self, BrowserHandler)> {
        let config = ChromeConfig::builder()
            .build()
            .map_err(|e| Error::BrowserDead(format!("failed to build browser config: {e}")))?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::BrowserDead(format!("failed to launch browser: {e}")))?;
        info!(max_contexts, "browser pool launched");
        Ok((
            Self {
                browser: Arc::new(tokio::sync::Mutex::new(browser)),
                permits: Arc::new(Semaphore::new(max_contexts)),
                max_dialog_buffer,
            },
            BrowserHandler(handler),
        ))
    }

    /// Acquire a fresh context/page. Blocks (FIFO-fair, via `tokio::Semaphore`)
    /// until a slot is free if the pool is at `max_contexts`.
    pub async fn acquire(&self) -> Result<(ChromiumSession, tokio::sync::OwnedSemaphorePermit)> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ResourceExhausted("browser pool semaphore closed".into()))?;

        let browser = self.browser.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::BrowserDead(format!("failed to open context: {e}")))?;
        drop(browser);

        Ok((ChromiumSession::from_pool(page, self.max_dialog_buffer), permit))
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn shutdown(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "error closing browser during pool shutdown");
        }
        let _ = browser.wait().await;
    }
}

/// Wraps the `chromiumoxide` event-loop handler future. The caller is
/// expected to spawn `run()` on the runtime alongside the pool so CDP
/// events keep draining.
pub struct BrowserHandler(chromiumoxide::Handler);

impl BrowserHandler {
    pub async fn run(mut self) {
        use futures_util::StreamExt;
        while let Some(event) = self.0.next().await {
            if let Err(e) = event {
                warn!(error = %e, "browser event stream error");
            }
        }
    }
}
