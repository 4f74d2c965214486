//! Action executor (§4.11): resolves a `ref` against the session's active
//! `PageMap`, validates the requested action and its value, performs the
//! corresponding browser primitive, and reports the resulting DOM change.

use once_cell::sync::Lazy;
use pagemap_browser::BrowserSession;
use pagemap_domain::model::{ActionKind, Affordance, ChangeSeverity, Interactable, PageMap};
use pagemap_domain::{Error, Result};
use std::collections::HashSet;
use tracing::warn;

use crate::dom_change::{capture_dom_fingerprint, compare_fingerprints};

pub const MAX_TYPE_VALUE_LENGTH: usize = 1000;
pub const MAX_SELECT_VALUE_LENGTH: usize = 500;

static ALLOWED_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Enter", "Tab", "Escape", "Backspace", "Delete", "Home", "End", "PageUp", "PageDown", "ArrowUp", "ArrowDown",
        "ArrowLeft", "ArrowRight", "Space", "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12",
    ]
    .into_iter()
    .collect()
});

static ALLOWED_COMBOS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["Shift+Tab", "Control+c", "Control+v", "Control+a", "Meta+c", "Meta+v", "Meta+a"].into_iter().collect());

static DANGEROUS_COMBOS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["Control+w", "Control+q", "Alt+F4", "Meta+q"].into_iter().collect());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomChange {
    None,
    Minor,
    Major,
    Navigation,
}

impl DomChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomChange::None => "none",
            DomChange::Minor => "minor",
            DomChange::Major => "major",
            DomChange::Navigation => "navigation",
        }
    }
}

#[derive(Debug)]
pub struct ActionOutcome {
    pub description: String,
    pub current_url: String,
    pub change: DomChange,
    pub refs_expired: bool,
    pub dialogs: Vec<serde_json::Value>,
}

/// Validate `value` against the action's length/whitelist constraints
/// before anything touches the browser.
fn validate_value(action: ActionKind, value: Option<&str>) -> Result<()> {
    match action {
        ActionKind::Type => {
            let v = value.ok_or_else(|| Error::InvalidInput("type requires a value".into()))?;
            if v.len() > MAX_TYPE_VALUE_LENGTH {
                return Err(Error::InvalidInput(format!(
                    "type value exceeds {MAX_TYPE_VALUE_LENGTH} characters"
                )));
            }
        }
        ActionKind::Select => {
            let v = value.ok_or_else(|| Error::InvalidInput("select requires a value".into()))?;
            if v.len() > MAX_SELECT_VALUE_LENGTH {
                return Err(Error::InvalidInput(format!(
                    "select value exceeds {MAX_SELECT_VALUE_LENGTH} characters"
                )));
            }
        }
        ActionKind::PressKey => {
            let key = value.ok_or_else(|| Error::InvalidInput("press_key requires a key name".into()))?;
            if DANGEROUS_COMBOS.contains(key) {
                return Err(Error::InvalidInput(format!("key combo \"{key}\" is never allowed")));
            }
            if !ALLOWED_KEYS.contains(key) && !ALLOWED_COMBOS.contains(key) {
                return Err(Error::InvalidInput(format!("key \"{key}\" is not in the allowed set")));
            }
        }
        ActionKind::Click => {}
    }
    Ok(())
}

/// Resolve `ref` (1-based) against `page_map.interactables`.
fn resolve_ref(page_map: &PageMap, r#ref: u32) -> Result<&Interactable> {
    page_map
        .interactables
        .iter()
        .find(|i| i.r#ref == r#ref)
        .ok_or_else(|| {
            let requested = r#ref;
            let valid: Vec<String> = page_map.interactables.iter().map(|i| i.r#ref.to_string()).collect();
            Error::InvalidInput(format!("ref {requested} is not valid. Valid refs: {}", valid.join(", ")))
        })
}

fn validate_affordance(interactable: &Interactable, action: ActionKind) -> Result<()> {
    let matches = matches!(
        (interactable.affordance, action),
        (Affordance::Click, ActionKind::Click)
            | (Affordance::Type, ActionKind::Type)
            | (Affordance::Select, ActionKind::Select)
            | (_, ActionKind::PressKey)
    );
    if matches {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "ref {} has affordance {:?}, not {:?}",
            interactable.r#ref, interactable.affordance, action
        )))
    }
}

/// Build the in-page script that resolves the target element by
/// role+name preferentially, falling back to its CSS selector, and
/// performs the requested primitive. `.first` semantics handle ambiguity.
fn build_action_script(interactable: &Interactable, action: ActionKind, value: Option<&str>) -> String {
    let selector_fallback = interactable
        .selector
        .as_deref()
        .map(|s| format!("document.querySelector({s:?})"))
        .unwrap_or_else(|| "null".to_string());

    let locate = format!(
        r#"(() => {{
  const byRoleName = Array.from(document.querySelectorAll('[role="{role}"]'))
    .find(el => (el.getAttribute('aria-label') || el.textContent || '').trim() === {name:?});
  return byRoleName || ({selector_fallback});
}})()"#,
        role = interactable.role,
        name = interactable.name,
    );

    match action {
        ActionKind::Click => format!("(() => {{ const el = {locate}; if (el) el.click(); return !!el; }})()"),
        ActionKind::Type => format!(
            "(() => {{ const el = {locate}; if (el) {{ el.value = {val:?}; el.dispatchEvent(new Event('input', {{bubbles:true}})); }} return !!el; }})()",
            val = value.unwrap_or("")
        ),
        ActionKind::Select => format!(
            "(() => {{ const el = {locate}; if (el) {{ el.value = {val:?}; el.dispatchEvent(new Event('change', {{bubbles:true}})); }} return !!el; }})()",
            val = value.unwrap_or("")
        ),
        ActionKind::PressKey => {
            // Keyboard events are dispatched by the session driver, not via
            // an in-page script; this path is unused for press_key.
            String::new()
        }
    }
}

/// Execute one action against `session`, given the current active
/// `page_map`. Returns `None` in place of a new page map to signal the
/// caller should invalidate its cached active entry when a navigation
/// occurred.
pub async fn execute_action(
    session: &dyn BrowserSession,
    page_map: &PageMap,
    r#ref: u32,
    action: ActionKind,
    value: Option<&str>,
) -> Result<ActionOutcome> {
    validate_value(action, value)?;
    let interactable = resolve_ref(page_map, r#ref)?;
    validate_affordance(interactable, action)?;

    let url_before = session.current_url().await?;
    let fingerprint_before = capture_dom_fingerprint(session).await;

    match action {
        ActionKind::PressKey => {
            let key = value.unwrap_or("Enter");
            session
                .evaluate(&format!(
                    "document.activeElement && document.activeElement.dispatchEvent(new KeyboardEvent('keydown', {{key: {key:?}, bubbles: true}}))"
                ))
                .await?;
        }
        _ => {
            let script = build_action_script(interactable, action, value);
            session.evaluate(&script).await?;
        }
    }

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let dialogs: Vec<serde_json::Value> = session
        .drain_dialogs()
        .into_iter()
        .map(|d| {
            serde_json::json!({
                "type": format!("{:?}", d.kind).to_lowercase(),
                "message": d.message,
                "dismissed": d.dismissed,
            })
        })
        .collect();

    let url_after = session.current_url().await?;

    let (change, refs_expired) = if url_after != url_before {
        warn!(r#ref, from = %url_before, to = %url_after, "action triggered navigation, invalidating cached refs");
        (DomChange::Navigation, true)
    } else {
        let severity = match (fingerprint_before, capture_dom_fingerprint(session).await) {
            (Some(before), Some(after)) => compare_fingerprints(&before, &after).0,
            _ => ChangeSeverity::None,
        };
        (
            match severity {
                ChangeSeverity::Major => DomChange::Major,
                ChangeSeverity::Minor => DomChange::Minor,
                ChangeSeverity::None => DomChange::None,
            },
            false,
        )
    };

    Ok(ActionOutcome {
        description: format!("performed {:?} on ref {}", action, r#ref),
        current_url: url_after,
        change,
        refs_expired,
        dialogs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemap_browser::FakeSession;
    use pagemap_domain::model::{Region, Tier};

    fn page_map_with(interactable: Interactable) -> PageMap {
        PageMap {
            url: "https://a.com".into(),
            title: "t".into(),
            page_type: pagemap_domain::model::PageType::Unknown,
            interactables: vec![interactable],
            pruned_context: String::new(),
            pruned_tokens: 0,
            generation_ms: 0.0,
            images: vec![],
            metadata: std::collections::HashMap::new(),
            warnings: vec![],
        }
    }

    fn button(r#ref: u32) -> Interactable {
        Interactable {
            r#ref,
            role: "button".into(),
            name: "Submit".into(),
            affordance: Affordance::Click,
            region: Region::Main,
            tier: Tier::Named,
            value: None,
            options: vec![],
            selector: None,
        }
    }

    #[tokio::test]
    async fn invalid_ref_returns_valid_refs_error() {
        let session = FakeSession::new("https://a.com");
        let map = page_map_with(button(1));
        let err = execute_action(&session, &map, 99, ActionKind::Click, None).await.unwrap_err();
        assert!(err.to_string().contains("Valid refs"));
    }

    #[tokio::test]
    async fn type_value_over_limit_is_rejected() {
        let session = FakeSession::new("https://a.com");
        let mut target = button(1);
        target.affordance = Affordance::Type;
        let map = page_map_with(target);
        let long_value = "x".repeat(MAX_TYPE_VALUE_LENGTH + 1);
        let err = execute_action(&session, &map, 1, ActionKind::Type, Some(&long_value)).await.unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[tokio::test]
    async fn dangerous_key_combo_is_never_allowed() {
        let session = FakeSession::new("https://a.com");
        let map = page_map_with(button(1));
        let err = execute_action(&session, &map, 1, ActionKind::PressKey, Some("Control+w")).await.unwrap_err();
        assert!(err.to_string().contains("never allowed"));
    }

    #[tokio::test]
    async fn affordance_mismatch_is_rejected() {
        let session = FakeSession::new("https://a.com");
        let map = page_map_with(button(1));
        let err = execute_action(&session, &map, 1, ActionKind::Select, Some("x")).await.unwrap_err();
        assert!(err.to_string().contains("affordance"));
    }

    #[tokio::test]
    async fn press_key_dispatches_a_well_formed_script() {
        let session = FakeSession::new("https://a.com");
        let map = page_map_with(button(1));
        execute_action(&session, &map, 1, ActionKind::PressKey, Some("Enter")).await.unwrap();
        let script = session.last_script.lock().clone().expect("evaluate was called");
        let open = script.matches('(').count();
        let close = script.matches(')').count();
        assert_eq!(open, close, "unbalanced parens in press_key script: {script}");
        assert!(script.contains("KeyboardEvent"));
    }

    #[tokio::test]
    async fn navigation_after_action_is_reported_and_expires_refs() {
        let session = FakeSession::new("https://a.com");
        let map = page_map_with(button(1));
        // Simulate navigation triggered by the click's script execution by
        // pre-seeding a new URL; in production this happens via the page's
        // own JS, here we drive the fake directly.
        session.navigate("https://a.com/next", pagemap_browser::NavStrategy::Load, 0).await.unwrap();
        let outcome = execute_action(&session, &map, 1, ActionKind::Click, None).await.unwrap();
        assert_eq!(outcome.change, DomChange::Navigation);
        assert!(outcome.refs_expired);
    }
}
