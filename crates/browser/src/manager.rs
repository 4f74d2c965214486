//! Session manager: ties together the browser pool, per-session tool
//! locks, dialog buffers, and page-map caches, and enforces the §4.6
//! recycle policy (navigation count, age, tab count).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use pagemap_domain::config::BrowserConfig;
use pagemap_domain::{Error, Result};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{info, warn};

use crate::cache::PageMapCache;
use crate::dialog::DialogBuffer;
use crate::lock::{SessionBusy, SessionLockMap};
use crate::pool::BrowserPool;
use crate::session::{BrowserSession, ChromiumSession};

pub struct SessionEntry {
    pub session: Arc<ChromiumSession>,
    pub cache: PageMapCache,
    pub dialogs: Arc<DialogBuffer>,
    created_at: Instant,
    last_used: Instant,
    navigation_count: u32,
    tab_count: usize,
    _permit: OwnedSemaphorePermit,
}

impl SessionEntry {
    fn should_recycle(&self, cfg: &BrowserConfig) -> bool {
        self.navigation_count >= cfg.max_navigations as u32
            || self.created_at.elapsed() >= Duration::from_secs(cfg.max_session_age_secs)
            || self.tab_count >= cfg.max_tabs_per_session
    }

    fn is_expired(&self, cfg: &BrowserConfig) -> bool {
        self.last_used.elapsed() >= Duration::from_secs(cfg.session_ttl_secs)
    }
}

/// Owns every live session keyed by an opaque session identifier supplied
/// by the transport layer (one per client conversation).
pub struct SessionManager {
    pool: Arc<BrowserPool>,
    sessions: DashMap<String, SessionEntry>,
    locks: SessionLockMap,
    cfg: BrowserConfig,
    cache_capacity: usize,
}

impl SessionManager {
    pub fn new(pool: Arc<BrowserPool>, cfg: BrowserConfig, cache_capacity: usize) -> Self {
        Self {
            pool,
            sessions: DashMap::new(),
            locks: SessionLockMap::new(Duration::from_secs(cfg.tool_lock_timeout_secs)),
            cfg,
            cache_capacity,
        }
    }

    /// Acquire the session's tool lock for the duration of one tool call.
    pub async fn acquire_lock(&self, session_key: &str) -> std::result::Result<OwnedSemaphorePermit, SessionBusy> {
        self.locks.acquire(session_key).await
    }

    /// Get the session's live `BrowserSession`, creating or recycling it
    /// as needed. Must be called while holding that session's tool lock.
    pub async fn get_or_create(&self, session_key: &str) -> Result<Arc<ChromiumSession>> {
        self.sweep_expired();

        if let Some(entry) = self.sessions.get(session_key) {
            if !entry.should_recycle(&self.cfg) && entry.session.is_alive().await {
                return Ok(entry.session.clone());
            }
        }

        if self.sessions.contains_key(session_key) {
            info!(session_key, "recycling session");
            self.recycle(session_key).await;
        }

        let (chrome_session, permit) = self.pool.acquire().await?;
        let session = Arc::new(chrome_session);
        self.sessions.insert(
            session_key.to_string(),
            SessionEntry {
                session: session.clone(),
                cache: PageMapCache::new(self.cache_capacity),
                dialogs: Arc::new(DialogBuffer::new(self.cfg.max_dialog_buffer)),
                created_at: Instant::now(),
                last_used: Instant::now(),
                navigation_count: 0,
                tab_count: 1,
                _permit: permit,
            },
        );
        Ok(session)
    }

    /// Record that a navigation occurred, bumping the recycle counters.
    pub async fn record_navigation(&self, session_key: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_key) {
            entry.navigation_count += 1;
            entry.last_used = Instant::now();
            entry.tab_count = entry.session.tab_count().await.max(1);
            entry.cache.invalidate_active();
        }
    }

    pub fn touch(&self, session_key: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_key) {
            entry.last_used = Instant::now();
        }
    }

    pub fn with_cache<R>(&self, session_key: &str, f: impl FnOnce(&mut PageMapCache) -> R) -> Option<R> {
        self.sessions.get_mut(session_key).map(|mut e| f(&mut e.cache))
    }

    async fn recycle(&self, session_key: &str) {
        if let Some((_, entry)) = self.sessions.remove(session_key) {
            entry.session.stop().await;
        }
    }

    /// Sweep sessions idle past `session_ttl_secs`. Called opportunistically
    /// from `get_or_create`; a background task may also call this on a
    /// timer.
    fn sweep_expired(&self) {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.is_expired(&self.cfg))
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            if let Some((_, entry)) = self.sessions.remove(&key) {
                let session = entry.session.clone();
                tokio::spawn(async move {
                    session.stop().await;
                });
                warn!(session_key = %key, "session expired and was torn down");
            }
        }
        self.locks.prune_idle();
    }

    /// Open a fresh, isolated context for batch page-map building — not
    /// tracked in `sessions`, not subject to any session's recycle policy.
    /// Bounded by the same pool semaphore as every other context.
    pub async fn open_isolated(&self) -> Result<(ChromiumSession, OwnedSemaphorePermit)> {
        self.pool.acquire().await
    }

    pub async fn shutdown(&self) {
        let keys: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, entry)) = self.sessions.remove(&key) {
                entry.session.stop().await;
            }
        }
    }
}

pub fn session_not_found(session_key: &str) -> Error {
    Error::InvalidInput(format!("no active session for key {session_key}"))
}
