//! Scrubbing of this system's own API-key family and bearer tokens from
//! free text and HTTP header tuples.

use once_cell::sync::Lazy;
use regex::Regex;

static API_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sk-pm-v\d+-[A-Za-z0-9_-]{43}").unwrap());

static BEARER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Bearer\s+\S+").unwrap());

/// Replace any occurrence of this system's API-key pattern with a redacted
/// marker. Operates byte-safely: the regex only matches ASCII, so match
/// boundaries always land on UTF-8 char boundaries.
pub fn scrub_from_text(s: &str) -> String {
    API_KEY_RE.replace_all(s, "sk-pm-***").into_owned()
}

/// Mask `Authorization: Bearer <token>` header values. `headers` is a list
/// of `(name, value)` tuples; returns a new list with sensitive values
/// masked.
pub fn scrub_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            if name.eq_ignore_ascii_case("authorization") {
                (name.clone(), BEARER_RE.replace(value, "Bearer ***").into_owned())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubs_api_key() {
        let key = format!("sk-pm-v1-{}", "a".repeat(43));
        let text = format!("here is a key: {key} end");
        let scrubbed = scrub_from_text(&text);
        assert!(!scrubbed.contains(&key));
        assert!(scrubbed.contains("sk-pm-***"));
    }

    #[test]
    fn leaves_non_matching_text_alone() {
        let text = "no secrets here";
        assert_eq!(scrub_from_text(text), text);
    }

    #[test]
    fn scrubs_bearer_header() {
        let headers = vec![("Authorization".to_string(), "Bearer abc.def.ghi".to_string())];
        let scrubbed = scrub_headers(&headers);
        assert_eq!(scrubbed[0].1, "Bearer ***");
    }

    #[test]
    fn leaves_non_auth_headers_alone() {
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        let scrubbed = scrub_headers(&headers);
        assert_eq!(scrubbed[0].1, "application/json");
    }
}
