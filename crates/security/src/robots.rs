//! Per-host robots.txt fetch + cache.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use texting_robots::Robot;
use tracing::warn;

struct CachedRobots {
    robot: Option<Arc<Robot>>,
    fetched_at: Instant,
}

pub struct RobotsChecker {
    cache: DashMap<String, CachedRobots>,
    client: reqwest::Client,
    fetch_timeout: Duration,
    max_bytes: usize,
    freshness_window: Duration,
}

impl RobotsChecker {
    pub fn new(fetch_timeout_ms: u64, max_bytes: usize) -> Self {
        Self {
            cache: DashMap::new(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(fetch_timeout_ms))
                .build()
                .expect("reqwest client builds"),
            fetch_timeout: Duration::from_millis(fetch_timeout_ms),
            max_bytes,
            freshness_window: Duration::from_secs(3600),
        }
    }

    /// `true` if `user_agent` may fetch `url`'s path. Fetches and caches
    /// the origin's robots.txt on first call. A failed fetch (network
    /// error or status >= 400) is treated as *allow* for that origin.
    pub async fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        let parsed = match url::Url::parse(url) {
            Ok(u) => u,
            Err(_) => return true, // not this checker's job to reject malformed URLs
        };
        let origin = parsed.origin().ascii_serialization();
        let path = parsed.path();

        let needs_refetch = match self.cache.get(&origin) {
            Some(entry) => entry.robot.is_none() && entry.fetched_at.elapsed() > self.freshness_window,
            None => true,
        };

        if needs_refetch {
            let robot = self.fetch(&origin, user_agent).await;
            self.cache.insert(
                origin.clone(),
                CachedRobots {
                    robot,
                    fetched_at: Instant::now(),
                },
            );
        }

        match self.cache.get(&origin) {
            Some(entry) => match &entry.robot {
                Some(robot) => robot.allowed(path),
                None => true,
            },
            None => true,
        }
    }

    async fn fetch(&self, origin: &str, user_agent: &str) -> Option<Arc<Robot>> {
        let robots_url = format!("{origin}/robots.txt");
        let resp = match tokio::time::timeout(self.fetch_timeout, self.client.get(&robots_url).send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                warn!(origin, error = %e, "robots.txt fetch failed, allowing");
                return None;
            }
            Err(_) => {
                warn!(origin, "robots.txt fetch timed out, allowing");
                return None;
            }
        };

        if resp.status().as_u16() >= 400 {
            return None;
        }

        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(_) => return None,
        };
        let capped = if bytes.len() > self.max_bytes {
            &bytes[..self.max_bytes]
        } else {
            &bytes[..]
        };

        match Robot::new(user_agent, capped) {
            Ok(robot) => Some(Arc::new(robot)),
            Err(_) => None,
        }
    }
}
