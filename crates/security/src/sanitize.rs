//! Output sanitization: strip prompt-injection vectors and wrap untrusted
//! page content in a nonced boundary before it reaches an agent prompt.

use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;

static BOUNDARY_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?web_content[_a-z0-9]*\s*>").unwrap());

static ANSI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap());

/// Line-leading role-spoofing prefixes, stripped up to and including the
/// closing `]` or `:`.
const ROLE_PREFIXES: &[&str] = &[
    "[SYSTEM]:",
    "[ADMIN]:",
    "[USER]:",
    "[SYSTEM",
    "SYSTEM:",
    "[ADMIN",
    "[USER",
    "ASSISTANT:",
    "ASSISTANT",
    "INSTRUCTION:",
    "INSTRUCTION",
    "IGNORE:",
    "IGNORE",
];

const ZERO_WIDTH_AND_CONTROL: &[char] = &[
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}', '\u{202A}', '\u{202B}', '\u{202C}', '\u{202D}',
    '\u{202E}', '\u{FFF9}', '\u{FFFA}', '\u{FFFB}', '\u{0000}',
];

fn is_stripped_control(c: char) -> bool {
    if ZERO_WIDTH_AND_CONTROL.contains(&c) {
        return true;
    }
    // C0 controls except tab/newline/cr, and all C1 controls.
    let code = c as u32;
    (code < 0x20 && c != '\t' && c != '\n' && c != '\r') || (0x80..=0x9F).contains(&code)
}

fn strip_role_prefix(line: &str) -> &str {
    let trimmed = line.trim_start();
    for prefix in ROLE_PREFIXES {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            // Consume through the first closing ']' or ':' if the matched
            // prefix didn't already include it.
            if prefix.ends_with(']') || prefix.ends_with(':') {
                return rest;
            }
            if let Some(idx) = rest.find([']', ':']) {
                return &rest[idx + 1..];
            }
            return rest;
        }
    }
    line
}

fn strip_common(s: &str, keep_newlines: bool) -> String {
    let key_scrubbed = crate::token_security::scrub_from_text(s);
    let boundary_stripped = BOUNDARY_TAG_RE.replace_all(&key_scrubbed, "");
    let ansi_stripped = ANSI_RE.replace_all(&boundary_stripped, "");
    let nbsp_decoded = ansi_stripped.replace('\u{00A0}', " ").replace("&nbsp;", " ");

    let mut out = String::with_capacity(nbsp_decoded.len());
    for line in nbsp_decoded.split('\n') {
        let line = strip_role_prefix(line);
        for c in line.chars() {
            if !is_stripped_control(c) {
                out.push(c);
            }
        }
        if keep_newlines {
            out.push('\n');
        } else {
            out.push(' ');
        }
    }
    if keep_newlines {
        out.pop(); // drop trailing newline we added
    }
    out
}

/// Truncate to at most `max_len` UTF-8 bytes, backing off to the nearest
/// character boundary rather than splitting a codepoint.
fn truncate_bytes(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut boundary = max_len;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    s[..boundary].to_string()
}

/// Sanitize a short single-line field: collapses whitespace to single
/// spaces, drops newlines entirely, truncates to `max_len` chars.
pub fn sanitize_text(s: &str, max_len: usize) -> String {
    let stripped = strip_common(s, false);
    let collapsed = collapse_whitespace(&stripped);
    truncate_bytes(&collapsed, max_len)
}

/// Sanitize multi-line content: preserves newline structure but still
/// strips control characters, boundary tags, role prefixes, and ANSI
/// sequences.
pub fn sanitize_content_block(s: &str, max_len: usize) -> String {
    let stripped = strip_common(s, true);
    truncate_bytes(&stripped, max_len)
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

/// Wrap `text` in a nonce-tagged content boundary so an agent prompt can
/// distinguish untrusted page content from instructions. The inner text
/// is itself run through `sanitize_content_block` first to neutralize any
/// nested boundary tags the page tried to inject.
pub fn add_content_boundary(text: &str, url: &str, max_len: usize) -> String {
    let nonce = random_nonce();
    let inner = sanitize_content_block(text, max_len);
    let escaped_url = escape_attr(url);
    let timestamp = iso8601_now();
    format!(
        "<web_content_{nonce} source=\"{escaped_url}\" timestamp=\"{timestamp}\">\n{inner}\n</web_content_{nonce}>"
    )
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn iso8601_now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
