//! Response-size clamping and OWASP security-header injection.

use tracing::warn;

/// Clamp `body` to `limit` UTF-8 bytes, truncating at a character boundary
/// and appending a marker naming the tool to retry with a narrower scope.
/// Returns `(output, was_truncated)`.
pub fn response_size_guard(body: &str, limit: usize, tool_hint: &str) -> (String, bool) {
    let bytes = body.as_bytes();
    if bytes.len() <= limit {
        return (body.to_string(), false);
    }

    let mut boundary = limit;
    while boundary > 0 && !body.is_char_boundary(boundary) {
        boundary -= 1;
    }
    let truncated = &body[..boundary];
    warn!(
        target: "guard.response_size_exceeded",
        original_bytes = bytes.len(),
        limit,
        tool = tool_hint,
        "response_size_exceeded"
    );
    let marker = format!("\n[Truncated: {} bytes; call {tool_hint} with narrower scope]", bytes.len());
    (format!("{truncated}{marker}"), true)
}

/// Reject an oversized screenshot outright rather than truncating binary
/// image data.
pub fn check_screenshot_size(bytes: &[u8], limit: usize) -> Result<(), String> {
    if bytes.len() > limit {
        Err(format!(
            "screenshot too large ({} bytes > {limit} byte limit); try full_page=false",
            bytes.len()
        ))
    } else {
        Ok(())
    }
}

/// The fixed set of OWASP security headers injected on every HTTP
/// response, as `(name, value)` pairs. Callers must not overwrite a
/// header the application already set for the same name.
pub fn security_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("X-Content-Type-Options", "nosniff"),
        ("X-Frame-Options", "DENY"),
        ("Referrer-Policy", "no-referrer"),
        ("Cross-Origin-Opener-Policy", "same-origin"),
        ("Cross-Origin-Resource-Policy", "same-origin"),
        (
            "Permissions-Policy",
            "geolocation=(), camera=(), microphone=(), payment=()",
        ),
        ("Content-Security-Policy", "default-src 'none'"),
    ]
}

/// Determine the effective request scheme given the raw scheme and any
/// `X-Forwarded-Proto` value, honoring the forwarded header only when the
/// peer is a trusted proxy.
pub fn effective_scheme(raw_scheme: &str, forwarded_proto: Option<&str>, peer_is_trusted_proxy: bool) -> String {
    if peer_is_trusted_proxy {
        if let Some(proto) = forwarded_proto {
            return proto.to_string();
        }
    }
    raw_scheme.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_under_limit() {
        let (out, truncated) = response_size_guard("hello", 100, "get_page_map");
        assert_eq!(out, "hello");
        assert!(!truncated);
    }

    #[test]
    fn truncates_and_appends_marker() {
        let body = "a".repeat(150);
        let (out, truncated) = response_size_guard(&body, 100, "get_page_map");
        assert!(truncated);
        assert!(out.contains("[Truncated: 150 bytes"));
        assert!(out.contains("get_page_map"));
    }

    #[test]
    fn truncation_never_splits_a_utf8_codepoint() {
        // Each 'é' is 2 bytes; force the boundary to land mid-codepoint.
        let body = "é".repeat(200);
        let (out, truncated) = response_size_guard(&body, 101, "get_page_map");
        assert!(truncated);
        let before_marker = &out[..out.find("\n[Truncated").unwrap()];
        assert!(std::str::from_utf8(before_marker.as_bytes()).is_ok());
    }

    #[test]
    fn screenshot_size_rejects_oversized() {
        let bytes = vec![0u8; 1000];
        assert!(check_screenshot_size(&bytes, 500).is_err());
        assert!(check_screenshot_size(&bytes, 2000).is_ok());
    }

    #[test]
    fn security_headers_cover_owasp_set() {
        let headers = security_headers();
        let names: Vec<_> = headers.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"X-Content-Type-Options"));
        assert!(names.contains(&"Content-Security-Policy"));
    }

    #[test]
    fn forwarded_proto_only_honored_from_trusted_proxy() {
        assert_eq!(effective_scheme("http", Some("https"), true), "https");
        assert_eq!(effective_scheme("http", Some("https"), false), "http");
    }
}
