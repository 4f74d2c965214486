//! Two-bucket (per-client + global) token-bucket rate limiter.

use dashmap::DashMap;
use pagemap_domain::model::TokenBucket;
use parking_lot::Mutex;
use std::time::Instant;
use tracing::warn;

/// Per-tool token cost. Unlisted tools default to 1.
pub fn tool_cost(tool_name: &str) -> f64 {
    match tool_name {
        "get_page_map" => 3.0,
        "execute_action" => 1.0,
        "navigate_back" => 1.0,
        "take_screenshot" => 2.0,
        "batch_get_page_map" => 5.0,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitOutcome {
    Allowed { remaining_client: f64, reset_seconds: u64 },
    Denied { retry_after_secs: u64 },
}

pub struct RateLimiter {
    per_client: DashMap<String, TokenBucket>,
    global: Mutex<TokenBucket>,
    client_capacity: f64,
    client_refill_rate: f64,
    start: Instant,
    pub warn_ratio: f64,
}

impl RateLimiter {
    pub fn new(client_capacity: f64, client_refill_rate: f64, global_capacity: f64, global_refill_rate: f64, warn_ratio: f64) -> Self {
        Self {
            per_client: DashMap::new(),
            global: Mutex::new(TokenBucket::new(global_capacity, global_refill_rate, 0.0)),
            client_capacity,
            client_refill_rate,
            start: Instant::now(),
            warn_ratio,
        }
    }

    fn now_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// The per-client bucket capacity, for a `RateLimit-Limit` response header.
    pub fn client_capacity(&self) -> f64 {
        self.client_capacity
    }

    /// Health endpoints bypass the limiter entirely; callers should not
    /// route `/health`, `/livez`, `/ready`, `/readyz`, `/startupz` through
    /// `acquire` at all.
    pub fn acquire(&self, client_key: &str, tool_name: &str) -> RateLimitOutcome {
        let cost = tool_cost(tool_name);
        let now = self.now_secs();

        if cost > self.client_capacity {
            return RateLimitOutcome::Denied {
                retry_after_secs: u64::MAX,
            };
        }

        let mut client_bucket = self
            .per_client
            .entry(client_key.to_string())
            .or_insert_with(|| TokenBucket::new(self.client_capacity, self.client_refill_rate, now));

        let mut global_bucket = self.global.lock();

        // Refill both before deciding so a denial reports an accurate
        // retry_after even when the client bucket alone would allow it.
        let client_ok = client_bucket.try_acquire(cost, now);
        if !client_ok {
            let retry = client_bucket.retry_after_secs(cost).ceil() as u64;
            return RateLimitOutcome::Denied { retry_after_secs: retry.max(1) };
        }
        let global_ok = global_bucket.try_acquire(cost, now);
        if !global_ok {
            // Refund the client-side deduction: global is the blocker.
            client_bucket.tokens += cost;
            let retry = global_bucket.retry_after_secs(cost).ceil() as u64;
            return RateLimitOutcome::Denied { retry_after_secs: retry.max(1) };
        }

        let remaining = client_bucket.tokens;
        if remaining <= self.client_capacity * self.warn_ratio {
            warn!(
                target: "rate_limit.warning",
                client = client_key,
                remaining,
                capacity = self.client_capacity,
                "client approaching rate limit"
            );
        }
        let reset_seconds = ((self.client_capacity - remaining) / self.client_refill_rate).ceil().max(0.0) as u64;
        RateLimitOutcome::Allowed {
            remaining_client: remaining,
            reset_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_over_capacity_is_immediately_denied() {
        let limiter = RateLimiter::new(10.0, 1.0, 1000.0, 100.0, 0.2);
        let outcome = limiter.acquire("client-a", "batch_get_page_map_oversized_tool");
        // default cost 1.0 for unknown tool name is fine; force an
        // oversized cost scenario via a tiny capacity limiter instead.
        let tiny = RateLimiter::new(2.0, 1.0, 1000.0, 100.0, 0.2);
        let outcome2 = tiny.acquire("client-a", "get_page_map"); // cost 3.0 > capacity 2.0
        assert!(matches!(outcome2, RateLimitOutcome::Denied { .. }));
        let _ = outcome;
    }

    #[test]
    fn exhausts_after_capacity_over_refill_rate_calls() {
        let limiter = RateLimiter::new(10.0, 0.0, 1000.0, 100.0, 0.2);
        for _ in 0..3 {
            let outcome = limiter.acquire("client-a", "get_page_map"); // cost 3
            assert!(matches!(outcome, RateLimitOutcome::Allowed { .. }));
        }
        let fourth = limiter.acquire("client-a", "get_page_map");
        assert!(matches!(fourth, RateLimitOutcome::Denied { .. }));
    }

    #[test]
    fn distinct_clients_have_independent_buckets() {
        let limiter = RateLimiter::new(3.0, 0.0, 1000.0, 100.0, 0.2);
        assert!(matches!(
            limiter.acquire("client-a", "get_page_map"),
            RateLimitOutcome::Allowed { .. }
        ));
        assert!(matches!(
            limiter.acquire("client-b", "get_page_map"),
            RateLimitOutcome::Allowed { .. }
        ));
    }

    #[test]
    fn global_bucket_denies_even_when_client_has_room() {
        let limiter = RateLimiter::new(100.0, 10.0, 3.0, 0.0, 0.2);
        assert!(matches!(
            limiter.acquire("client-a", "get_page_map"),
            RateLimitOutcome::Allowed { .. }
        ));
        let denied = limiter.acquire("client-b", "get_page_map");
        assert!(matches!(denied, RateLimitOutcome::Denied { .. }));
    }
}
