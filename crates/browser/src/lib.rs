//! Browser pool and session management: a pooled `chromiumoxide` browser,
//! per-session tool locks, dialog buffers, and page-map caches, tied
//! together by `SessionManager`'s recycle policy.

pub mod cache;
pub mod dialog;
pub mod lock;
pub mod manager;
pub mod pool;
pub mod session;

pub use cache::PageMapCache;
pub use dialog::{auto_action, DialogBuffer};
pub use lock::{SessionBusy, SessionLockMap};
pub use manager::{session_not_found, SessionEntry, SessionManager};
pub use pool::{BrowserHandler, BrowserPool};
pub use pagemap_domain::ax::{AxTreeSource, RawAxNode};
pub use session::{BrowserSession, ChromiumSession, NavStrategy};

#[cfg(any(test, feature = "test-fake"))]
pub use session::FakeSession;
