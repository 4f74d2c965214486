//! Shared data model: `PageMap`, `Interactable`, `HtmlChunk`, and the
//! enumerations that classify pages and pruning decisions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable per-request result of building a page map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMap {
    pub url: String,
    pub title: String,
    pub page_type: PageType,
    /// `ref` values are `1..N` contiguous; invariant enforced by the
    /// assembler's re-numbering pass after interactable budget filtering.
    pub interactables: Vec<Interactable>,
    pub pruned_context: String,
    pub pruned_tokens: u32,
    pub generation_ms: f64,
    pub images: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub warnings: Vec<String>,
}

impl PageMap {
    /// `true` when every `ref` in `interactables` forms the contiguous
    /// range `1..=len`, as required by the assembler's invariant.
    pub fn has_contiguous_refs(&self) -> bool {
        self.interactables
            .iter()
            .map(|i| i.r#ref)
            .eq(1..=self.interactables.len() as u32)
    }
}

/// A single addressable UI control surfaced from the accessibility tree
/// (or, in offline mode, from a small HTML rule set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interactable {
    /// 1-based address used by agents to target this element.
    pub r#ref: u32,
    pub role: String,
    pub name: String,
    pub affordance: Affordance,
    pub region: Region,
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

/// What action a given interactable accepts. Total mapping from AX role;
/// a role with no mapped affordance is a programming error, not a runtime
/// one (see `pagemap_detect::role_affordance`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    Click,
    Type,
    Select,
    PressKey,
}

/// Landmark region an interactable (or pruned chunk) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Header,
    Main,
    Footer,
    Navigation,
    Complementary,
}

impl Default for Region {
    fn default() -> Self {
        Region::Main
    }
}

/// 1 = the element has a non-whitespace accessible name; 2 = unnamed.
/// Tier-2 elements are deprioritized in budget filtering but never
/// dropped from the AX walk itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tier {
    Named = 1,
    Unnamed = 2,
}

/// Atomic pruning unit produced by DOM decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlChunk {
    pub xpath: String,
    pub html: String,
    pub text: String,
    pub tag: String,
    pub chunk_type: ChunkType,
    #[serde(default)]
    pub attrs: HashMap<String, String>,
    #[serde(default)]
    pub parent_xpath: String,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub in_main: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Table,
    List,
    TextBlock,
    Heading,
    Media,
    Form,
    Meta,
    RscData,
}

/// UI classification of a page, orthogonal to `SchemaName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    ProductDetail,
    SearchResults,
    Article,
    Listing,
    News,
    Login,
    Form,
    Checkout,
    Dashboard,
    HelpFaq,
    Settings,
    Error,
    Documentation,
    Landing,
    Video,
    Blocked,
    Unknown,
}

/// Structured-data classification derived from JSON-LD and URL shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SchemaName {
    Product,
    NewsArticle,
    WikiArticle,
    SaaSPage,
    GovernmentPage,
    #[serde(rename = "FAQPage")]
    FaqPage,
    Event,
    LocalBusiness,
    VideoObject,
    Generic,
}

/// Schema-specific structured fields pulled from JSON-LD/meta markup,
/// surfaced as `PageMap.metadata["schema_extraction"]` when at least one
/// field resolves. Every field is optional: most pages only populate a
/// subset of a schema's structured data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductExtraction {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub original_price: Option<f64>,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub brand: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsArticleExtraction {
    pub headline: Option<String>,
    pub author: Option<String>,
    pub date_published: Option<String>,
    pub article_body: Option<String>,
    pub publisher: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WikiArticleExtraction {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub categories: Option<Vec<String>>,
    pub last_edited: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaaSPageExtraction {
    pub name: Option<String>,
    pub description: Option<String>,
    pub primary_language: Option<String>,
    pub stars: Option<u32>,
    pub license: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernmentPageExtraction {
    pub title: Option<String>,
    pub department: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub contact_info: Option<String>,
}

/// Tagged union of the five schema-specific extraction shapes. The
/// internal `schema` tag lets a consumer dispatch on the JSON value
/// alone, without cross-referencing `metadata["schema_name"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "schema")]
pub enum SchemaExtraction {
    Product(ProductExtraction),
    NewsArticle(NewsArticleExtraction),
    WikiArticle(WikiArticleExtraction),
    SaaSPage(SaaSPageExtraction),
    GovernmentPage(GovernmentPageExtraction),
}

/// Why a chunk was kept or removed by the pruner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PruneReason {
    MetaAlwaysKeep,
    SchemaMatch,
    InMainHeading,
    InMainText,
    InMainHighValueShort,
    InMainStructured,
    InMainForm,
    InMainMedia,
    InMainShort,
    KeepHeadingNoMain,
    KeepTextNoMain,
    KeepFormNoMain,
    KeepMediaNoMain,
    SiteSpecific(String),
    NoMatch,
}

/// Dominant Unicode script of a page or chunk of text, used by the
/// pruned-context compressors to drop short non-dominant-script noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDominance {
    Latin,
    Cjk,
    Hangul,
    Hiragana,
    Katakana,
    Cyrillic,
    Arabic,
    Common,
    Unknown,
}

/// Severity of a DOM change detected after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSeverity {
    None,
    Minor,
    Major,
}

/// A fingerprint of interactive DOM shape, compared before/after an
/// action to classify the resulting change severity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomFingerprint {
    pub interactive_counts: HashMap<String, u32>,
    pub total_interactives: u32,
    pub has_dialog: bool,
    pub body_child_count: u32,
    pub title: String,
    pub content_hash: u64,
}

/// A single token bucket's mutable state. `updated_at` is a monotonic
/// seconds timestamp (not wall-clock) so refill math is immune to clock
/// adjustments.
#[derive(Debug, Clone, Copy)]
pub struct TokenBucket {
    pub capacity: f64,
    pub refill_rate: f64,
    pub tokens: f64,
    pub updated_at: f64,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_rate: f64, now: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            updated_at: now,
        }
    }

    /// Refill based on elapsed time since `updated_at`, then attempt to
    /// deduct `cost`. Returns `true` (and deducts) if there were enough
    /// tokens, `false` (no mutation beyond the refill) otherwise.
    pub fn try_acquire(&mut self, cost: f64, now: f64) -> bool {
        let elapsed = (now - self.updated_at).max(0.0);
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.updated_at = now;
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Seconds until `cost` tokens would be available, given the current
    /// (already-refilled) token count.
    pub fn retry_after_secs(&self, cost: f64) -> f64 {
        if self.tokens >= cost {
            0.0
        } else {
            ((cost - self.tokens) / self.refill_rate).max(0.0)
        }
    }
}

/// A recorded JS dialog (alert/confirm/prompt/beforeunload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogRecord {
    #[serde(rename = "type")]
    pub kind: DialogKind,
    pub message: String,
    pub dismissed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Alert,
    Confirm,
    Prompt,
    Beforeunload,
}

/// The four action verbs the executor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    Select,
    PressKey,
}

impl std::str::FromStr for ActionKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(ActionKind::Click),
            "type" => Ok(ActionKind::Type),
            "select" => Ok(ActionKind::Select),
            "press_key" => Ok(ActionKind::PressKey),
            other => Err(format!(
                "invalid action \"{other}\"; valid actions: click, type, select, press_key"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_refs_detected() {
        let make = |refs: Vec<u32>| PageMap {
            url: "http://example.com".into(),
            title: "t".into(),
            page_type: PageType::Unknown,
            interactables: refs
                .into_iter()
                .map(|r| Interactable {
                    r#ref: r,
                    role: "button".into(),
                    name: "x".into(),
                    affordance: Affordance::Click,
                    region: Region::Main,
                    tier: Tier::Named,
                    value: None,
                    options: vec![],
                    selector: None,
                })
                .collect(),
            pruned_context: String::new(),
            pruned_tokens: 0,
            generation_ms: 0.0,
            images: vec![],
            metadata: HashMap::new(),
            warnings: vec![],
        };
        assert!(make(vec![1, 2, 3]).has_contiguous_refs());
        assert!(!make(vec![1, 3]).has_contiguous_refs());
        assert!(make(vec![]).has_contiguous_refs());
    }

    #[test]
    fn action_kind_parses_valid_actions() {
        assert_eq!("click".parse::<ActionKind>().unwrap(), ActionKind::Click);
        assert_eq!("press_key".parse::<ActionKind>().unwrap(), ActionKind::PressKey);
        assert!("exec".parse::<ActionKind>().is_err());
    }

    #[test]
    fn token_bucket_cost_over_capacity_always_denied() {
        let mut bucket = TokenBucket::new(10.0, 1.0, 0.0);
        assert!(!bucket.try_acquire(11.0, 0.0));
    }

    #[test]
    fn token_bucket_refills_over_time() {
        let mut bucket = TokenBucket::new(10.0, 1.0, 0.0);
        assert!(bucket.try_acquire(10.0, 0.0));
        assert!(!bucket.try_acquire(1.0, 0.5));
        assert!(bucket.try_acquire(1.0, 1.0));
    }
}
