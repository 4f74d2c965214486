//! SSRF-safe URL validation.
//!
//! Relies on `url::Url`'s WHATWV-spec host parser to canonicalize every
//! IP representation a browser would accept for a "special" scheme
//! (http/https) — dotted decimal, dotted octal, single decimal integer,
//! single hex, and IPv4-mapped IPv6 all normalize to a concrete
//! [`std::net::IpAddr`] before classification runs. Hand-rolling that
//! parser would mean re-deriving exactly the ambiguity this module exists
//! to close; `url` already implements it to the same spec real browsers
//! use, which is also why it is safe to trust for this purpose.

use std::net::{IpAddr, Ipv4Addr};

const BLOCKED_HOSTNAMES: &[&str] = &["localhost", "metadata.google.internal", "metadata", "instance-data"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IpClass {
    CloudMetadata,
    Private,
    Public,
}

fn classify_ipv4(ip: Ipv4Addr) -> IpClass {
    let o = ip.octets();
    if o[0] == 169 && o[1] == 254 {
        return IpClass::CloudMetadata;
    }
    if o[0] == 0 // 0.0.0.0/8
        || o[0] == 10 // 10.0.0.0/8
        || (o[0] == 172 && (16..=31).contains(&o[1])) // 172.16.0.0/12
        || (o[0] == 192 && o[1] == 168) // 192.168.0.0/16
        || (o[0] == 100 && (64..=127).contains(&o[1])) // 100.64.0.0/10 (CGNAT)
        || o[0] == 127 // 127.0.0.0/8
    {
        return IpClass::Private;
    }
    IpClass::Public
}

fn classify_ipv6(ip: std::net::Ipv6Addr) -> IpClass {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return classify_ipv4(v4);
    }
    if ip == std::net::Ipv6Addr::LOCALHOST {
        return IpClass::Private;
    }
    // fe80::/10 link-local.
    let segments = ip.segments();
    if (segments[0] & 0xffc0) == 0xfe80 {
        return IpClass::CloudMetadata;
    }
    IpClass::Public
}

fn classify_ip(ip: IpAddr) -> IpClass {
    match ip {
        IpAddr::V4(v4) => classify_ipv4(v4),
        IpAddr::V6(v6) => classify_ipv6(v6),
    }
}

/// Validate a URL for safe navigation. Returns `None` on success, or a
/// short human-readable rejection reason. Never performs network I/O —
/// see [`validate_url_with_dns`] for the DNS-resolved post-check.
pub fn validate_url(raw: &str, allow_local: bool) -> Option<String> {
    let parsed = match url::Url::parse(raw) {
        Ok(u) => u,
        Err(e) => return Some(format!("invalid URL: {e}")),
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Some(format!("scheme must be http or https, got \"{}\"", parsed.scheme()));
    }

    let host = match parsed.host() {
        Some(h) => h,
        None => return Some("URL has no hostname".into()),
    };

    match &host {
        url::Host::Domain(d) => {
            let lower = d.to_lowercase();
            if BLOCKED_HOSTNAMES.contains(&lower.as_str()) || lower.ends_with(".local") {
                return Some(format!("blocked hostname: {lower}"));
            }
            None
        }
        url::Host::Ipv4(ip) => classify_and_reject(IpAddr::V4(*ip), allow_local),
        url::Host::Ipv6(ip) => classify_and_reject(IpAddr::V6(*ip), allow_local),
    }
}

fn classify_and_reject(ip: IpAddr, allow_local: bool) -> Option<String> {
    match classify_ip(ip) {
        IpClass::CloudMetadata => Some(format!("blocked: {ip} is a cloud metadata address")),
        IpClass::Private if !allow_local => Some(format!("blocked: {ip} is a private/loopback address")),
        IpClass::Private | IpClass::Public => None,
    }
}

/// Resolve a hostname via the system resolver. The concrete `resolve`
/// closure `validate_url_with_dns` wants; split out so callers don't each
/// need to depend on `hickory-resolver` directly.
pub async fn system_resolve(host: String) -> std::io::Result<Vec<IpAddr>> {
    use hickory_resolver::TokioAsyncResolver;
    let resolver = TokioAsyncResolver::tokio(Default::default(), Default::default());
    let lookup = resolver
        .lookup_ip(host)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(lookup.iter().collect())
}

/// Resolve `url`'s host via DNS and classify every returned address,
/// rejecting the URL if any address is disallowed. `resolve` is injected
/// so callers (and tests) can swap in a mock resolver without network I/O.
pub async fn validate_url_with_dns<F, Fut>(raw: &str, allow_local: bool, resolve: F) -> Option<String>
where
    F: FnOnce(String) -> Fut,
    Fut: std::future::Future<Output = std::io::Result<Vec<IpAddr>>>,
{
    if let Some(reason) = validate_url(raw, allow_local) {
        return Some(reason);
    }
    let parsed = url::Url::parse(raw).expect("already validated above");
    let host = match parsed.host() {
        Some(url::Host::Domain(d)) => d.to_string(),
        // Literal IPs were already fully classified by validate_url.
        _ => return None,
    };
    match resolve(host.clone()).await {
        Ok(addrs) => {
            for addr in addrs {
                if let Some(reason) = classify_and_reject(addr, allow_local) {
                    return Some(format!("DNS resolution of {host} yielded a blocked address: {reason}"));
                }
            }
            None
        }
        Err(e) => Some(format!("DNS resolution failed for {host}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        assert!(validate_url("ftp://example.com/", false).is_some());
        assert!(validate_url("file:///etc/passwd", false).is_some());
    }

    #[test]
    fn accepts_ordinary_https_url() {
        assert!(validate_url("https://example.com/page", false).is_none());
    }

    #[test]
    fn rejects_localhost_and_dot_local() {
        assert!(validate_url("http://localhost/", false).is_some());
        assert!(validate_url("http://printer.local/", false).is_some());
        assert!(validate_url("http://metadata.google.internal/", false).is_some());
    }

    #[test]
    fn rejects_decimal_integer_loopback() {
        let reason = validate_url("http://2130706433/", false);
        assert!(reason.as_deref().unwrap_or_default().contains("private"));
    }

    #[test]
    fn rejects_hex_loopback() {
        let reason = validate_url("http://0x7f000001/", false);
        assert!(reason.is_some());
    }

    #[test]
    fn rejects_octal_loopback() {
        let reason = validate_url("http://0177.0.0.1/", false);
        assert!(reason.as_deref().unwrap_or_default().contains("private"));
    }

    #[test]
    fn rejects_ipv4_mapped_ipv6_loopback() {
        let reason = validate_url("http://[::ffff:127.0.0.1]/", false);
        assert!(reason.is_some());
    }

    #[test]
    fn cloud_metadata_rejected_even_with_allow_local() {
        let reason = validate_url("http://169.254.169.254/", true);
        assert!(reason.unwrap().contains("cloud metadata"));
    }

    #[test]
    fn allow_local_permits_private_ranges() {
        assert!(validate_url("http://10.0.0.5/", true).is_none());
        assert!(validate_url("http://127.0.0.1/", true).is_none());
        assert!(validate_url("http://192.168.1.1/", true).is_none());
    }

    #[test]
    fn allow_local_false_rejects_private_ranges() {
        assert!(validate_url("http://10.0.0.5/", false).is_some());
        assert!(validate_url("http://100.64.0.1/", false).is_some());
    }

    #[test]
    fn bad_octal_component_falls_through_to_hostname() {
        // "0189" has digit 8/9, invalid octal; the url crate's WHATWG
        // parser falls back to treating this as an ordinary domain label,
        // matching the "NOT an octal IP" fall-through rule.
        assert!(validate_url("http://0189.example.com/", false).is_none());
    }

    #[test]
    fn equivalent_decimal_and_dotted_forms_classify_the_same() {
        let dotted = validate_url("http://127.0.0.1/", false);
        let decimal = validate_url("http://2130706433/", false);
        assert_eq!(dotted.is_some(), decimal.is_some());
    }

    #[tokio::test]
    async fn dns_post_check_rejects_resolved_private_address() {
        let reason = validate_url_with_dns("https://internal.example.com/", false, |_host| async {
            Ok(vec!["10.0.0.1".parse().unwrap()])
        })
        .await;
        assert!(reason.is_some());
    }

    #[tokio::test]
    async fn dns_post_check_allows_resolved_public_address() {
        let reason = validate_url_with_dns("https://public.example.com/", false, |_host| async {
            Ok(vec!["93.184.216.34".parse().unwrap()])
        })
        .await;
        assert!(reason.is_none());
    }
}
