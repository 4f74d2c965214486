//! Script-dominance filter (§4.15, SUPPLEMENT). Applied inside the
//! pruned-context compressors after chunk selection and before the final
//! token-budget truncation: classifies each run's dominant Unicode script
//! against the page's overall dominant script (classification only, not
//! full language detection) and drops short non-dominant-script runs with
//! no passthrough exception.

use once_cell::sync::Lazy;
use pagemap_domain::model::ScriptDominance;
use regex::Regex;

const MIN_RUN_LEN_TO_KEEP: usize = 50;
const PASSTHROUGH_MAX_LEN: usize = 5;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://|^www\.").unwrap());
static NUMBER_UNIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\d.,]+\s*(%|kg|g|lb|oz|km|mi|m|cm|mm|in|ft|usd|eur|krw|jpy|\$|€|₩|¥)?$").unwrap()
});

pub fn classify(text: &str) -> ScriptDominance {
    let mut counts: std::collections::HashMap<ScriptDominance, usize> = std::collections::HashMap::new();
    for ch in text.chars() {
        if let Some(script) = classify_char(ch) {
            if script != ScriptDominance::Common {
                *counts.entry(script).or_insert(0) += 1;
            }
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, n)| *n)
        .map(|(s, _)| s)
        .unwrap_or(ScriptDominance::Latin)
}

fn classify_char(ch: char) -> Option<ScriptDominance> {
    let cp = ch as u32;
    if !ch.is_alphabetic() {
        return None;
    }
    Some(match cp {
        0x3040..=0x309F => ScriptDominance::Hiragana,
        0x30A0..=0x30FF => ScriptDominance::Katakana,
        0xAC00..=0xD7A3 => ScriptDominance::Hangul,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF => ScriptDominance::Cjk,
        0x0400..=0x04FF => ScriptDominance::Cyrillic,
        0x0600..=0x06FF | 0x0750..=0x077F => ScriptDominance::Arabic,
        0x0041..=0x024F => ScriptDominance::Latin,
        _ => ScriptDominance::Common,
    })
}

/// Looks like a brand name: a short run of capitalized alphanumeric
/// tokens with no lowercase-script admixture (e.g. "iPhone", "BTS",
/// "K-POP") — a coarse heuristic, not NER.
fn looks_like_brand_name(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty()
        && trimmed.len() <= 24
        && trimmed.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
        && trimmed.chars().all(|c| c.is_alphanumeric() || c == '-' || c == ' ')
}

fn has_passthrough_exception(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.chars().count() <= PASSTHROUGH_MAX_LEN
        || URL_PATTERN.is_match(trimmed)
        || NUMBER_UNIT_PATTERN.is_match(trimmed)
        || looks_like_brand_name(trimmed)
}

/// Apply the filter to one text run relative to the page's dominant
/// script. Returns `None` if the run should be dropped, `Some(text)`
/// (possibly `[lang] `-prefixed) otherwise.
pub fn filter_run(text: &str, page_dominant: ScriptDominance) -> Option<String> {
    let run_script = classify(text);
    if run_script == page_dominant || run_script == ScriptDominance::Common {
        return Some(text.to_string());
    }

    let len = text.trim().chars().count();
    if len < MIN_RUN_LEN_TO_KEEP {
        if has_passthrough_exception(text) {
            return Some(text.to_string());
        }
        return None;
    }

    Some(format!("[{}] {}", lang_tag(run_script), text))
}

fn lang_tag(script: ScriptDominance) -> &'static str {
    match script {
        ScriptDominance::Latin => "latin",
        ScriptDominance::Cjk => "cjk",
        ScriptDominance::Hangul => "ko",
        ScriptDominance::Hiragana | ScriptDominance::Katakana => "ja",
        ScriptDominance::Cyrillic => "ru",
        ScriptDominance::Arabic => "ar",
        ScriptDominance::Common => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_korean_text_as_hangul() {
        assert_eq!(classify("안녕하세요"), ScriptDominance::Hangul);
    }

    #[test]
    fn classifies_mixed_ascii_as_latin() {
        assert_eq!(classify("hello world"), ScriptDominance::Latin);
    }

    #[test]
    fn short_non_dominant_run_with_no_exception_is_dropped() {
        assert_eq!(filter_run("일시적 팝업 텍스트", ScriptDominance::Latin), None);
    }

    #[test]
    fn short_non_dominant_url_is_kept() {
        let url = "https://example.com/ko";
        assert_eq!(filter_run(url, ScriptDominance::Latin), Some(url.to_string()));
    }

    #[test]
    fn long_non_dominant_run_is_kept_with_lang_prefix() {
        let text = "이것은 오십자 이상의 긴 한국어 텍스트 블록으로 페이지의 주요 언어와 다릅니다 정말로 그렇습니다";
        let out = filter_run(text, ScriptDominance::Latin).unwrap();
        assert!(out.starts_with("[ko] "));
    }

    #[test]
    fn dominant_script_run_passes_through_unchanged() {
        let text = "just some regular english text";
        assert_eq!(filter_run(text, ScriptDominance::Latin), Some(text.to_string()));
    }

    #[test]
    fn brand_name_heuristic_keeps_short_capitalized_token() {
        assert!(looks_like_brand_name("iPhone"));
        assert!(!looks_like_brand_name("the quick brown fox jumps"));
    }
}
