//! `serve --transport stdio`: run the MCP server over the process's own
//! stdin/stdout using `rmcp`'s line-delimited JSON-RPC transport.

use std::sync::Arc;

use rmcp::ServiceExt;

use crate::dispatcher::PageMapTools;
use crate::server::PageMapServer;

/// Runs until stdin closes (the parent process disconnected) or the
/// transport reports an error.
pub async fn run<T: PageMapTools>(tools: Arc<T>) -> anyhow::Result<()> {
    let server = PageMapServer::new(tools);
    let running = server.serve(rmcp::transport::io::stdio()).await?;
    running.waiting().await?;
    Ok(())
}
