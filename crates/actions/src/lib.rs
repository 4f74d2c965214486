//! Action execution against an open browser session: validates and
//! performs `click`/`type`/`select`/`press_key` against a resolved
//! interactable, then classifies the resulting DOM change.

pub mod dom_change;
pub mod executor;

pub use dom_change::{capture_dom_fingerprint, compare_fingerprints};
pub use executor::{execute_action, ActionOutcome, DomChange, MAX_SELECT_VALUE_LENGTH, MAX_TYPE_VALUE_LENGTH};
