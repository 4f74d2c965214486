//! Per-session tool lock: serializes tool calls within a session and
//! returns a busy error if the lock is held past `TOOL_LOCK_TIMEOUT`.
//!
//! Adapted from a per-session turn-lock pattern keyed semaphore map,
//! generalized from "one conversation turn" to "one tool call" and given
//! an explicit acquisition timeout rather than blocking indefinitely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Returned when a tool call could not acquire the session's lock within
/// the configured timeout.
#[derive(Debug, Clone)]
pub struct SessionBusy {
    pub session_key: String,
    pub hint: String,
}

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{\"error\": \"another tool call is in progress, retry in a moment. {}\"}}",
            self.hint
        )
    }
}

/// A keyed map of per-session binary semaphores.
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
    timeout: Duration,
}

impl SessionLockMap {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn semaphore_for(&self, session_key: &str) -> Arc<Semaphore> {
        let mut locks = self.locks.lock();
        locks
            .entry(session_key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Acquire the session's lock, waiting up to the configured timeout.
    /// The returned permit must be held for the duration of the tool call
    /// and dropped (or allowed to drop) as soon as it completes — callers
    /// must not hold it across suspension points beyond the tool's own
    /// work, per the ordering guarantee.
    pub async fn acquire(&self, session_key: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = self.semaphore_for(session_key);

        if let Ok(permit) = sem.clone().try_acquire_owned() {
            return Ok(permit);
        }

        match tokio::time::timeout(self.timeout, sem.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(SessionBusy {
                session_key: session_key.to_string(),
                hint: "the semaphore was closed unexpectedly".into(),
            }),
            Err(_) => Err(SessionBusy {
                session_key: session_key.to_string(),
                hint: "call again once the in-flight tool call finishes".into(),
            }),
        }
    }

    /// Drop lock entries for sessions no longer referenced elsewhere
    /// (every clone of the inner `Arc` is held only by an in-flight
    /// acquire, so a strong count of 1 means nobody is waiting on it).
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| Arc::strong_count(sem) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sequential_access_reuses_the_same_lock() {
        let locks = SessionLockMap::new(Duration::from_secs(1));
        let p1 = locks.acquire("s1").await.unwrap();
        drop(p1);
        let p2 = locks.acquire("s1").await.unwrap();
        drop(p2);
    }

    #[tokio::test]
    async fn different_sessions_proceed_concurrently() {
        let locks = Arc::new(SessionLockMap::new(Duration::from_secs(1)));
        let a = locks.clone();
        let b = locks.clone();
        let h1 = tokio::spawn(async move {
            let _p = a.acquire("s1").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        });
        let h2 = tokio::spawn(async move {
            let _p = b.acquire("s2").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        });
        let start = std::time::Instant::now();
        h1.await.unwrap();
        h2.await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn same_session_waits_then_times_out() {
        let locks = Arc::new(SessionLockMap::new(Duration::from_millis(50)));
        let a = locks.clone();
        let _held = a.acquire("s1").await.unwrap();
        let b = locks.clone();
        let result = b.acquire("s1").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn same_session_waits_then_succeeds_once_released() {
        let locks = Arc::new(SessionLockMap::new(Duration::from_secs(2)));
        let a = locks.clone();
        let first = a.acquire("s1").await.unwrap();
        let b = locks.clone();
        let waiter = tokio::spawn(async move { b.acquire("s1").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        let result = waiter.await.unwrap();
        assert!(result.is_ok());
    }
}
