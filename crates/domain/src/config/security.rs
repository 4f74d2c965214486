use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// URL validation / SSRF guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Accept private/loopback/CGNAT addresses. Cloud-metadata addresses
    /// remain rejected regardless of this flag — see §4.2 rule 4.
    #[serde(default)]
    pub allow_local: bool,
    #[serde(default = "d_response_size_limit")]
    pub response_size_limit_bytes: usize,
    #[serde(default = "d_screenshot_size_limit")]
    pub screenshot_size_limit_bytes: usize,
    #[serde(default)]
    pub bot_ua: bool,
    #[serde(default = "d_user_agent")]
    pub user_agent: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_local: false,
            response_size_limit_bytes: d_response_size_limit(),
            screenshot_size_limit_bytes: d_screenshot_size_limit(),
            bot_ua: false,
            user_agent: d_user_agent(),
        }
    }
}

impl SecurityConfig {
    /// The User-Agent string to navigate with: the bot UA when requested,
    /// else a current-Chrome-style default.
    pub fn effective_user_agent(&self) -> String {
        if self.bot_ua {
            format!(
                "PageMapBot/{} (+https://github.com/Retio-ai/pagemap)",
                env!("CARGO_PKG_VERSION")
            )
        } else {
            self.user_agent.clone()
        }
    }
}

fn d_response_size_limit() -> usize {
    1024 * 1024
}
fn d_screenshot_size_limit() -> usize {
    4 * 1024 * 1024
}
fn d_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate limiting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "d_client_capacity")]
    pub per_client_capacity: f64,
    #[serde(default = "d_client_refill")]
    pub per_client_refill_rate: f64,
    #[serde(default = "d_global_capacity")]
    pub global_capacity: f64,
    #[serde(default = "d_global_refill")]
    pub global_refill_rate: f64,
    /// Warn (telemetry) when a client's remaining tokens fall to or below
    /// this fraction of its bucket capacity.
    #[serde(default = "d_warn_ratio")]
    pub warn_ratio: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_client_capacity: d_client_capacity(),
            per_client_refill_rate: d_client_refill(),
            global_capacity: d_global_capacity(),
            global_refill_rate: d_global_refill(),
            warn_ratio: d_warn_ratio(),
        }
    }
}

fn d_client_capacity() -> f64 {
    30.0
}
fn d_client_refill() -> f64 {
    1.0
}
fn d_global_capacity() -> f64 {
    200.0
}
fn d_global_refill() -> f64 {
    10.0
}
fn d_warn_ratio() -> f64 {
    0.2
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Robots
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsConfig {
    #[serde(default)]
    pub ignore_robots: bool,
    #[serde(default = "d_robots_timeout")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "d_robots_max_bytes")]
    pub max_bytes: usize,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            ignore_robots: false,
            fetch_timeout_ms: d_robots_timeout(),
            max_bytes: d_robots_max_bytes(),
        }
    }
}

fn d_robots_timeout() -> u64 {
    3_000
}
fn d_robots_max_bytes() -> usize {
    512 * 1024
}
