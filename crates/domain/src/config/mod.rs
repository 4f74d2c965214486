mod browser;
mod prune;
mod security;
mod server;

pub use browser::*;
pub use prune::*;
pub use security::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub prune: PruneConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration, returning every issue found.
    ///
    /// An empty result means the config is safe to serve with. Any
    /// `ConfigSeverity::Error` entry should make `serve` refuse to start
    /// (see §6.5 security guardrails: `--cors-origin '*'` and
    /// `--trusted-proxy '*'` not bound to loopback are hard errors, not
    /// warnings).
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        // `--cors-origin '*'` is rejected outright (§6.5); a non-wildcard
        // list may still contain a `:*` port-wildcard suffix, which is
        // handled as a predicate match, not a literal wildcard.
        if self
            .server
            .cors
            .allowed_origins
            .iter()
            .any(|o| o == "*")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" origin is rejected; list explicit origins".into(),
            });
        }

        // `--trusted-proxy '*'` is rejected unless bound to loopback.
        let host_is_loopback = self
            .server
            .host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false);
        if self.server.trusted_proxies.iter().any(|p| p == "*") && !host_is_loopback {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.trusted_proxies".into(),
                message: "'*' trusted proxy is only allowed when bound to loopback".into(),
            });
        }

        if self.rate_limit.per_client_capacity <= 0.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "rate_limit.per_client_capacity".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.rate_limit.global_capacity <= 0.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "rate_limit.global_capacity".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.browser.max_contexts == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "browser.max_contexts".into(),
                message: "must be greater than 0".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.prune.aom_threshold) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "prune.aom_threshold".into(),
                message: "must be within [0.0, 1.0]".into(),
            });
        }

        if self.security.allow_local {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "security.allow_local".into(),
                message: "private/loopback addresses are navigable; cloud metadata remains blocked".into(),
            });
        }

        errors
    }
}
