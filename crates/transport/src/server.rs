//! The MCP tool surface: argument schemas plus the `rmcp` server handler
//! that forwards each call to a [`PageMapTools`] implementation.

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{tool, ServerHandler};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatcher::PageMapTools;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPageMapArgs {
    /// Navigate here first; omit to rebuild the map for the current page.
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteActionArgs {
    pub r#ref: u32,
    pub action: String,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TakeScreenshotArgs {
    #[serde(default)]
    pub full_page: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchGetPageMapArgs {
    pub urls: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    5
}

/// Generic over any [`PageMapTools`] implementation so the gateway can
/// inject its session-manager-backed handler without this crate knowing
/// about browsers, caches, or locks.
#[derive(Clone)]
pub struct PageMapServer<T: PageMapTools> {
    tools: Arc<T>,
}

impl<T: PageMapTools> PageMapServer<T> {
    pub fn new(tools: Arc<T>) -> Self {
        Self { tools }
    }
}

#[tool(tool_box)]
impl<T: PageMapTools> PageMapServer<T> {
    #[tool(description = "Build or refresh the page map for the current (or given) URL: \
        numbered interactable elements plus a token-budgeted pruned text context.")]
    async fn get_page_map(&self, #[tool(aggr)] args: GetPageMapArgs) -> Result<CallToolResult, rmcp::Error> {
        let text = self.tools.get_page_map(args.url).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Perform click/type/select/press_key on a ref from the last page map.")]
    async fn execute_action(&self, #[tool(aggr)] args: ExecuteActionArgs) -> Result<CallToolResult, rmcp::Error> {
        let text = self.tools.execute_action(args.r#ref, args.action, args.value).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Go back in browser history, if any, and invalidate the cached page map.")]
    async fn navigate_back(&self) -> Result<CallToolResult, rmcp::Error> {
        let text = self.tools.navigate_back().await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Capture a PNG screenshot of the current page.")]
    async fn take_screenshot(&self, #[tool(aggr)] args: TakeScreenshotArgs) -> Result<CallToolResult, rmcp::Error> {
        let out = self.tools.take_screenshot(args.full_page).await;
        let mut content = Vec::new();
        if let Some(png) = out.png {
            content.push(Content::image(base64_encode(&png), "image/png"));
        }
        content.push(Content::text(out.text));
        Ok(CallToolResult::success(content))
    }

    #[tool(description = "Fetch page maps for several URLs concurrently (results go into cache only, never `active`).")]
    async fn batch_get_page_map(&self, #[tool(aggr)] args: BatchGetPageMapArgs) -> Result<CallToolResult, rmcp::Error> {
        let concurrency = args.concurrency.min(10);
        let text = self.tools.batch_get_page_map(args.urls, concurrency).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool(tool_box)]
impl<T: PageMapTools> ServerHandler for PageMapServer<T> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pagemap".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            instructions: Some(
                "Browse the web through numbered, role-named interactables and a pruned text \
                 context instead of raw HTML. Call get_page_map before execute_action."
                    .into(),
            ),
        }
    }
}

pub(crate) fn base64_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    const CHARS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity((bytes.len() + 2) / 3 * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        let n = ((b0 as u32) << 16) | ((b1 as u32) << 8) | b2 as u32;
        let _ = write!(
            out,
            "{}{}{}{}",
            CHARS[(n >> 18 & 0x3f) as usize] as char,
            CHARS[(n >> 12 & 0x3f) as usize] as char,
            if chunk.len() > 1 { CHARS[(n >> 6 & 0x3f) as usize] as char } else { '=' },
            if chunk.len() > 2 { CHARS[(n & 0x3f) as usize] as char } else { '=' },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_encodes_png_magic_bytes() {
        let encoded = base64_encode(&[0x89, b'P', b'N', b'G']);
        assert_eq!(encoded, "iVBORw==");
    }

    #[test]
    fn default_concurrency_is_five() {
        assert_eq!(default_concurrency(), 5);
    }
}
