//! DOM-change detector (§4.13): a before/after `DomFingerprint` pair is
//! compared to classify the severity of an in-page change that wasn't a
//! navigation.

use pagemap_browser::BrowserSession;
use pagemap_domain::model::{ChangeSeverity, DomFingerprint};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Tolerance below which a change in `total_interactives` is ignored —
/// small count drift (e.g. a toast appearing) shouldn't read as major.
const INTERACTIVE_COUNT_TOLERANCE: u32 = 2;

/// A jump in `body_child_count` at or above this is treated as major
/// regardless of the interactive-count tolerance.
const BODY_CHILD_JUMP_THRESHOLD: u32 = 5;

const FINGERPRINT_SCRIPT: &str = r#"(() => {
  const counts = {};
  document.querySelectorAll('[role]').forEach(el => {
    const role = el.getAttribute('role');
    counts[role] = (counts[role] || 0) + 1;
  });
  const total = Object.values(counts).reduce((a, b) => a + b, 0);
  const hasDialog = !!document.querySelector('[role="dialog"], [role="alertdialog"]');
  const sample = (document.body ? document.body.innerText : '').slice(0, 500);
  return {
    interactive_counts: counts,
    total_interactives: total,
    has_dialog: hasDialog,
    body_child_count: document.body ? document.body.children.length : 0,
    title: document.title || '',
    sample,
  };
})()"#;

/// Capture a fingerprint of the page's interactive shape via an in-page
/// script. Tolerant to any browser-side failure: returns `None` rather
/// than propagating, since fingerprinting is advisory, not load-bearing.
pub async fn capture_dom_fingerprint(session: &dyn BrowserSession) -> Option<DomFingerprint> {
    let value = match session.evaluate(FINGERPRINT_SCRIPT).await {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "dom fingerprint capture failed, skipping change classification");
            return None;
        }
    };
    let obj = value.as_object()?;

    let interactive_counts: HashMap<String, u32> = obj
        .get("interactive_counts")?
        .as_object()?
        .iter()
        .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n as u32)))
        .collect();

    let sample = obj.get("sample").and_then(|v| v.as_str()).unwrap_or("");
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    sample.hash(&mut hasher);

    Some(DomFingerprint {
        interactive_counts,
        total_interactives: obj.get("total_interactives")?.as_u64()? as u32,
        has_dialog: obj.get("has_dialog")?.as_bool()?,
        body_child_count: obj.get("body_child_count")?.as_u64()? as u32,
        title: obj.get("title")?.as_str()?.to_string(),
        content_hash: hasher.finish(),
    })
}

/// Compare two fingerprints and classify the resulting severity, with the
/// specific reasons that drove the classification.
pub fn compare_fingerprints(before: &DomFingerprint, after: &DomFingerprint) -> (ChangeSeverity, Vec<String>) {
    let mut reasons = Vec::new();

    if after.has_dialog && !before.has_dialog {
        reasons.push("a dialog appeared".to_string());
    }
    if before.title != after.title {
        reasons.push(format!("title changed from \"{}\" to \"{}\"", before.title, after.title));
    }
    let interactive_delta = before.total_interactives.abs_diff(after.total_interactives);
    if interactive_delta > INTERACTIVE_COUNT_TOLERANCE {
        reasons.push(format!(
            "interactive count changed by {interactive_delta} (tolerance {INTERACTIVE_COUNT_TOLERANCE})"
        ));
    }
    let body_delta = before.body_child_count.abs_diff(after.body_child_count);
    if body_delta >= BODY_CHILD_JUMP_THRESHOLD {
        reasons.push(format!("body child count jumped by {body_delta}"));
    }

    if !reasons.is_empty() {
        return (ChangeSeverity::Major, reasons);
    }

    if before.content_hash != after.content_hash {
        return (ChangeSeverity::Minor, vec!["content changed but interactive shape is stable".to_string()]);
    }

    (ChangeSeverity::None, vec![])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(total: u32, body: u32, title: &str, dialog: bool, hash: u64) -> DomFingerprint {
        DomFingerprint {
            interactive_counts: HashMap::new(),
            total_interactives: total,
            has_dialog: dialog,
            body_child_count: body,
            title: title.to_string(),
            content_hash: hash,
        }
    }

    #[test]
    fn dialog_appearing_is_major() {
        let before = fp(3, 10, "t", false, 1);
        let after = fp(3, 10, "t", true, 1);
        let (sev, reasons) = compare_fingerprints(&before, &after);
        assert_eq!(sev, ChangeSeverity::Major);
        assert!(reasons.iter().any(|r| r.contains("dialog")));
    }

    #[test]
    fn title_change_is_major() {
        let before = fp(3, 10, "Home", false, 1);
        let after = fp(3, 10, "Cart", false, 1);
        assert_eq!(compare_fingerprints(&before, &after).0, ChangeSeverity::Major);
    }

    #[test]
    fn small_interactive_drift_within_tolerance_is_not_major() {
        let before = fp(10, 10, "t", false, 1);
        let after = fp(11, 10, "t", false, 1);
        assert_eq!(compare_fingerprints(&before, &after).0, ChangeSeverity::None);
    }

    #[test]
    fn interactive_count_beyond_tolerance_is_major() {
        let before = fp(10, 10, "t", false, 1);
        let after = fp(14, 10, "t", false, 1);
        assert_eq!(compare_fingerprints(&before, &after).0, ChangeSeverity::Major);
    }

    #[test]
    fn body_child_jump_is_major() {
        let before = fp(10, 10, "t", false, 1);
        let after = fp(10, 20, "t", false, 1);
        assert_eq!(compare_fingerprints(&before, &after).0, ChangeSeverity::Major);
    }

    #[test]
    fn content_hash_diff_alone_is_minor() {
        let before = fp(10, 10, "t", false, 1);
        let after = fp(10, 10, "t", false, 2);
        assert_eq!(compare_fingerprints(&before, &after).0, ChangeSeverity::Minor);
    }

    #[test]
    fn identical_fingerprints_are_none() {
        let before = fp(10, 10, "t", false, 1);
        let after = fp(10, 10, "t", false, 1);
        assert_eq!(compare_fingerprints(&before, &after).0, ChangeSeverity::None);
    }

    #[tokio::test]
    async fn capture_on_fake_session_returns_none_since_evaluate_yields_null() {
        let session = pagemap_browser::FakeSession::new("https://a.com");
        let fp = capture_dom_fingerprint(&session).await;
        assert!(fp.is_none());
    }
}
