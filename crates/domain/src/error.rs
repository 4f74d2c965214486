/// Shared error type used across all PageMap crates.
///
/// Variants map onto the error-kind table in the design doc: each one
/// carries enough context for the tool boundary to build a user-facing
/// message and recovery hint without re-inspecting the failing stage.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("blocked: {0}")]
    SsrfBlocked(String),

    #[error("robots.txt disallows this URL: {0}")]
    RobotsBlocked(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("timeout during {stage}")]
    Timeout { stage: String },

    #[error("browser connection lost: {0}")]
    BrowserDead(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("accessibility tree detection failed: {0}")]
    DetectionFailed(String),

    #[error("response too large, truncated at {limit} bytes")]
    SerializationTooLarge { limit: usize },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Unexpected(String),
}

impl Error {
    /// A short, internals-free reason suitable for returning to an agent.
    ///
    /// Strips anything resembling a file path, bearer token, or API key and
    /// caps the result at 200 chars, matching the propagation policy for
    /// unexpected errors.
    pub fn sanitized_message(&self) -> String {
        let raw = self.to_string();
        let scrubbed = scrub(&raw);
        if scrubbed.len() > 200 {
            let mut truncated: String = scrubbed.chars().take(200).collect();
            truncated.push('…');
            truncated
        } else {
            scrubbed
        }
    }

    /// Recovery hint keyed by error kind, appended to agent-facing messages.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "check the argument shape and retry",
            Error::SsrfBlocked(_) => "choose a public, non-internal URL",
            Error::RobotsBlocked(_) => "this site disallows automated access to this path",
            Error::RateLimited { .. } => "wait for Retry-After before calling again",
            Error::Timeout { .. } => "retry with a narrower scope or simpler page",
            Error::BrowserDead(_) => "retry the call; the session will use a fresh browser",
            Error::ResourceExhausted(_) => "close unused sessions or reduce concurrency",
            Error::DetectionFailed(_) => "interactables may be incomplete; pruned_context is still usable",
            Error::SerializationTooLarge { .. } => "call again with narrower scope",
            Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Unexpected(_) => {
                "retry; if this persists, report it"
            }
        }
    }
}

fn scrub(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for line in s.split_inclusive('\n') {
        if let Some(idx) = line.find("Bearer ") {
            out.push_str(&line[..idx]);
            out.push_str("Bearer ***");
            continue;
        }
        if line.contains('/') && (line.contains(".rs") || line.contains(".py") || line.starts_with('/')) {
            out.push_str("<path omitted>");
            continue;
        }
        out.push_str(line);
    }
    out
}

pub type Result<T> = std::result::Result<T, Error>;
