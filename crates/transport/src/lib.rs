//! MCP server transport: a `PageMapTools` implementation (owned by the
//! gateway) is exposed over either `stdio` (via `rmcp`) or `http` (a
//! hand-framed `POST /mcp` JSON-RPC endpoint plus health probes), per the
//! two transports named in the external-interfaces section of the design.

pub mod dispatcher;
pub mod health;
pub mod http;
pub mod protocol;
pub mod server;
pub mod stdio;

pub use dispatcher::{HealthProbe, PageMapTools, ScreenshotOutput};
pub use server::PageMapServer;
