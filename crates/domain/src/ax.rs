//! Shared accessibility-tree types. Lives in the domain crate so the
//! browser pool (which can fetch a real tree over CDP) and the detector
//! (which only needs to walk one) don't have to depend on each other.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One node of a flattened accessibility tree, as returned by a CDP
/// `Accessibility.getFullAXTree`-shaped call: nodes reference children by
/// id rather than nesting directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAxNode {
    pub id: String,
    pub role: String,
    pub name: String,
    pub value: Option<String>,
    pub child_ids: Vec<String>,
    pub ignored: bool,
}

/// Capability for fetching a page's full accessibility tree. Implemented
/// by the browser pool's session type; consumed by the detector without
/// either crate depending on the other's internals.
#[async_trait]
pub trait AxTreeSource: Send + Sync {
    async fn fetch_ax_tree(&self) -> Result<Vec<RawAxNode>>;
}
