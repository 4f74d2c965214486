//! Token-budget computation for the pruned-context builder (§4.9).

use once_cell::sync::Lazy;
use tiktoken_rs::{cl100k_base, CoreBPE};

const SAMPLE_CHARS: usize = 2000;

static TOKENIZER: Lazy<CoreBPE> = Lazy::new(|| cl100k_base().expect("cl100k_base tokenizer data"));

/// Count tokens the same way the compressors verify their output against
/// `max_tokens`.
pub fn count_tokens(text: &str) -> usize {
    TOKENIZER.encode_ordinary(text).len()
}

fn locale_base_multiplier(locale: &str) -> f64 {
    match locale.split('-').next().unwrap_or(locale) {
        "ko" => 1.8,
        "ja" => 1.5,
        _ => 1.0,
    }
}

/// `(pruned_context_budget, total_budget, multiplier, cjk_ratio)`.
pub fn compute_token_budget(locale: &str, raw_html: Option<&str>, base_pruned: u32, base_total: u32) -> (u32, u32, f64, f64) {
    let base_multiplier = locale_base_multiplier(locale);
    let is_cjk_locale = base_multiplier > 1.0;

    let cjk_ratio = raw_html.map(|html| cjk_ratio_of(html)).unwrap_or(0.0);

    let multiplier = if !is_cjk_locale && cjk_ratio > 0.3 {
        base_multiplier + (cjk_ratio - 0.3).min(1.0)
    } else if is_cjk_locale && cjk_ratio < 0.1 {
        base_multiplier - (base_multiplier - 1.0) * (0.1 - cjk_ratio).min(0.1) / 0.1
    } else {
        base_multiplier
    }
    .clamp(1.0, 2.5);

    let pruned = (base_pruned as f64 * multiplier).round() as u32;
    let total = (base_total as f64 * multiplier).round() as u32;
    (pruned, total, multiplier, cjk_ratio)
}

/// Extract up to `SAMPLE_CHARS` of visible body text (excluding head,
/// script, style, noscript) and compute the CJK-character ratio over
/// total letters.
fn cjk_ratio_of(html: &str) -> f64 {
    let visible = visible_text_sample(html, SAMPLE_CHARS);
    let mut cjk = 0usize;
    let mut letters = 0usize;
    for ch in visible.chars() {
        if ch.is_alphabetic() {
            letters += 1;
            if is_cjk(ch) {
                cjk += 1;
            }
        }
    }
    if letters == 0 {
        0.0
    } else {
        cjk as f64 / letters as f64
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF |
        0x3040..=0x309F | 0x30A0..=0x30FF |
        0xAC00..=0xD7A3
    )
}

fn visible_text_sample(html: &str, max_chars: usize) -> String {
    use scraper::{Html, Selector};
    let document = Html::parse_fragment(html);
    let skip = Selector::parse("head,script,style,noscript").unwrap();
    let skip_ids: std::collections::HashSet<_> = document.select(&skip).map(|e| e.id()).collect();

    let mut out = String::new();
    for text_node in document.tree.nodes() {
        if out.len() >= max_chars {
            break;
        }
        if let Some(text) = text_node.value().as_text() {
            let under_skip = text_node.ancestors().any(|a| skip_ids.contains(&a.id()));
            if !under_skip {
                out.push_str(text);
            }
        }
    }
    out.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_locale_without_raw_html_uses_base_multiplier() {
        let (pruned, total, mult, ratio) = compute_token_budget("en", None, 1500, 5000);
        assert_eq!(mult, 1.0);
        assert_eq!(ratio, 0.0);
        assert_eq!(pruned, 1500);
        assert_eq!(total, 5000);
    }

    #[test]
    fn korean_locale_gets_lifted_base_multiplier() {
        let (_, _, mult, _) = compute_token_budget("ko", None, 1500, 5000);
        assert_eq!(mult, 1.8);
    }

    #[test]
    fn cjk_heavy_content_in_english_locale_lifts_multiplier() {
        let cjk_html = "<body>".to_string() + &"中".repeat(1000) + "</body>";
        let (_, _, mult, ratio) = compute_token_budget("en", Some(&cjk_html), 1500, 5000);
        assert!(ratio > 0.3);
        assert!(mult > 1.0);
    }

    #[test]
    fn multiplier_is_clamped_to_two_point_five() {
        let cjk_html = "<body>".to_string() + &"中".repeat(2000) + "</body>";
        let (_, _, mult, _) = compute_token_budget("en", Some(&cjk_html), 1500, 5000);
        assert!(mult <= 2.5);
    }

    #[test]
    fn script_and_style_text_excluded_from_sample() {
        let html = "<body><script>var cjk='中文中文';</script><p>hello world</p></body>";
        let sample = visible_text_sample(html, 2000);
        assert!(!sample.contains('中'));
        assert!(sample.contains("hello world"));
    }

    #[test]
    fn count_tokens_is_nonzero_for_nonempty_text() {
        assert!(count_tokens("hello world, this is a test") > 0);
        assert_eq!(count_tokens(""), 0);
    }
}
