//! `serve --transport http`: `POST /mcp` plus the health probes, behind
//! OWASP security headers and per-client rate limiting.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use pagemap_security::guards::{effective_scheme, security_headers};
use pagemap_security::rate_limit::{RateLimitOutcome, RateLimiter};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::dispatcher::{HealthProbe, PageMapTools};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
use crate::server::{BatchGetPageMapArgs, ExecuteActionArgs, GetPageMapArgs, TakeScreenshotArgs};

#[derive(Clone)]
struct McpState<T: PageMapTools> {
    tools: Arc<T>,
}

/// Proxies trusted to set `X-Forwarded-Proto`, and whether TLS is required
/// of the effective scheme. Shared state for [`tls_guard_mw`].
#[derive(Clone)]
struct TlsGuardState {
    require_tls: bool,
    trusted_proxies: Vec<String>,
}

/// Build the full HTTP surface: `POST /mcp` plus `/health`, `/livez`,
/// `/ready`, `/readyz`, `/startupz`, with rate limiting, CORS, TLS
/// enforcement, and security headers applied to every response.
pub fn router<T: PageMapTools>(
    tools: Arc<T>,
    probe: Arc<dyn HealthProbe>,
    rate_limiter: Arc<RateLimiter>,
    allowed_origins: &[String],
    require_tls: bool,
    trusted_proxies: &[String],
) -> Router {
    let mcp = Router::new()
        .route("/mcp", post(handle_mcp::<T>))
        .with_state(McpState { tools })
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_mw));

    let tls_guard = TlsGuardState {
        require_tls,
        trusted_proxies: trusted_proxies.to_vec(),
    };

    Router::new()
        .merge(mcp)
        .merge(crate::health::router(probe, "http"))
        .layer(cors_layer(allowed_origins))
        .layer(middleware::from_fn_with_state(tls_guard, tls_guard_mw))
        .layer(middleware::from_fn(security_headers_mw))
}

/// A `https://www.retio.ai/pagemap/errors/<slug>` problem+json response.
fn problem_response(status: StatusCode, error_slug: &str) -> Response {
    let body = Json(json!({
        "type": format!("https://www.retio.ai/pagemap/errors/{error_slug}"),
        "status": status.as_u16(),
    }));
    let mut response = (status, body).into_response();
    if let Ok(value) = HeaderValue::try_from("application/problem+json") {
        response.headers_mut().insert(axum::http::header::CONTENT_TYPE, value);
    }
    response
}

/// When `require_tls` is set, reject any request whose effective scheme
/// (the raw scheme, or `X-Forwarded-Proto` from a trusted proxy) is not
/// `https`, before it reaches rate limiting or the handler. The outer
/// `security_headers_mw` layer still decorates the 421 response.
async fn tls_guard_mw(State(cfg): State<TlsGuardState>, request: Request, next: Next) -> Response {
    if !cfg.require_tls {
        return next.run(request).await;
    }
    // Extracted from extensions rather than as a function parameter so a
    // missing ConnectInfo (e.g. in tests that don't need it) only matters
    // when TLS enforcement is actually on.
    let peer_ip = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0.ip().to_string());
    let forwarded_proto = request.headers().get("x-forwarded-proto").and_then(|v| v.to_str().ok());
    let peer_is_trusted_proxy = peer_ip
        .as_deref()
        .map(|ip| cfg.trusted_proxies.iter().any(|p| p == "*" || p == ip))
        .unwrap_or(false);
    let scheme = effective_scheme("http", forwarded_proto, peer_is_trusted_proxy);
    if scheme != "https" {
        return problem_response(StatusCode::MISDIRECTED_REQUEST, "tls-required");
    }
    next.run(request).await
}

/// `ServerConfig::cors.allowed_origins` entries are either an exact
/// origin or a `scheme://host:*` port wildcard (`Config::validate`
/// already rejects a bare `"*"`); `tower_http`'s `AllowOrigin::predicate`
/// lets us match both without pulling in a separate matcher crate.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let patterns: Vec<String> = allowed_origins.to_vec();
    CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(tower_http::cors::Any)
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin.to_str().map(|o| patterns.iter().any(|p| origin_matches(p, o))).unwrap_or(false)
        }))
}

fn origin_matches(pattern: &str, origin: &str) -> bool {
    match pattern.strip_suffix(":*") {
        Some(prefix) => match origin.strip_prefix(prefix).and_then(|rest| rest.strip_prefix(':')) {
            Some(port) => !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()),
            None => false,
        },
        None => pattern == origin,
    }
}

async fn security_headers_mw(request: axum::extract::Request, next: Next) -> axum::response::Response {
    let mut response = next.run(request).await;
    for (name, value) in security_headers() {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            response.headers_mut().entry(name).or_insert(value);
        }
    }
    response
}

async fn rate_limit_mw(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client_key = addr.ip().to_string();
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let tool_name = tool_name_from_body(&bytes);
    let request = Request::from_parts(parts, Body::from(bytes));

    match limiter.acquire(&client_key, &tool_name) {
        RateLimitOutcome::Allowed { remaining_client, reset_seconds } => {
            let mut response = next.run(request).await;
            set_rate_limit_headers(&mut response, limiter.client_capacity(), remaining_client, reset_seconds);
            response
        }
        RateLimitOutcome::Denied { retry_after_secs } => {
            let mut response = problem_response(StatusCode::TOO_MANY_REQUESTS, "rate-limit-exceeded");
            if let Ok(value) = HeaderValue::try_from(retry_after_secs.to_string()) {
                response.headers_mut().insert(HeaderName::from_static("retry-after"), value);
            }
            response
        }
    }
}

fn set_rate_limit_headers(response: &mut Response, limit: f64, remaining: f64, reset_seconds: u64) {
    let headers = [
        ("ratelimit-limit", format!("{limit:.0}")),
        ("ratelimit-remaining", format!("{:.0}", remaining.max(0.0))),
        ("ratelimit-reset", reset_seconds.to_string()),
    ];
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::try_from(value) {
            response.headers_mut().insert(HeaderName::from_static(name), value);
        }
    }
}

/// The rate limiter costs by tool name, which only lives in the JSON-RPC
/// body (`params.name`), not the URL. Buffer the body here to read it,
/// then hand the handler an equivalent request built from the same bytes
/// so it can parse the body again.
fn tool_name_from_body(bytes: &[u8]) -> String {
    serde_json::from_slice::<Value>(bytes)
        .ok()
        .and_then(|v| v.get("params")?.get("name")?.as_str().map(str::to_string))
        .unwrap_or_default()
}

async fn handle_mcp<T: PageMapTools>(State(state): State<McpState<T>>, Json(req): Json<JsonRpcRequest>) -> Json<JsonRpcResponse> {
    let response = match req.method.as_str() {
        "tools/list" => JsonRpcResponse::ok(req.id, json!({ "tools": tool_defs() })),
        "tools/call" => handle_tools_call(&state, req).await,
        other => JsonRpcResponse::err(req.id, METHOD_NOT_FOUND, format!("unknown method \"{other}\"")),
    };
    Json(response)
}

async fn handle_tools_call<T: PageMapTools>(state: &McpState<T>, req: JsonRpcRequest) -> JsonRpcResponse {
    let params = match req.params {
        Some(p) => p,
        None => return JsonRpcResponse::err(req.id, INVALID_PARAMS, "tools/call requires params"),
    };
    let name = match params.get("name").and_then(Value::as_str) {
        Some(n) => n.to_string(),
        None => return JsonRpcResponse::err(req.id, INVALID_PARAMS, "missing params.name"),
    };
    let args = params.get("arguments").cloned().unwrap_or(Value::Null);

    let result = match name.as_str() {
        "get_page_map" => match serde_json::from_value::<GetPageMapArgs>(args) {
            Ok(a) => text_result(state.tools.get_page_map(a.url).await),
            Err(e) => return JsonRpcResponse::err(req.id, INVALID_PARAMS, e.to_string()),
        },
        "execute_action" => match serde_json::from_value::<ExecuteActionArgs>(args) {
            Ok(a) => text_result(state.tools.execute_action(a.r#ref, a.action, a.value).await),
            Err(e) => return JsonRpcResponse::err(req.id, INVALID_PARAMS, e.to_string()),
        },
        "navigate_back" => text_result(state.tools.navigate_back().await),
        "take_screenshot" => match serde_json::from_value::<TakeScreenshotArgs>(args) {
            Ok(a) => {
                let out = state.tools.take_screenshot(a.full_page).await;
                let mut content = Vec::new();
                if let Some(png) = out.png {
                    content.push(json!({"type": "image", "data": crate::server::base64_encode(&png), "mimeType": "image/png"}));
                }
                content.push(json!({"type": "text", "text": out.text}));
                json!({"content": content, "isError": false})
            }
            Err(e) => return JsonRpcResponse::err(req.id, INVALID_PARAMS, e.to_string()),
        },
        "batch_get_page_map" => match serde_json::from_value::<BatchGetPageMapArgs>(args) {
            Ok(a) => text_result(state.tools.batch_get_page_map(a.urls, a.concurrency.min(10)).await),
            Err(e) => return JsonRpcResponse::err(req.id, INVALID_PARAMS, e.to_string()),
        },
        other => return JsonRpcResponse::err(req.id, METHOD_NOT_FOUND, format!("unknown tool \"{other}\"")),
    };

    JsonRpcResponse::ok(req.id, result)
}

fn text_result(text: String) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": false})
}

fn tool_defs() -> Value {
    json!([
        {"name": "get_page_map", "description": "Build or refresh the page map for the current (or given) URL.", "inputSchema": schemars::schema_for!(GetPageMapArgs)},
        {"name": "execute_action", "description": "Perform click/type/select/press_key on a ref from the last page map.", "inputSchema": schemars::schema_for!(ExecuteActionArgs)},
        {"name": "navigate_back", "description": "Go back in browser history, if any.", "inputSchema": {"type": "object", "properties": {}}},
        {"name": "take_screenshot", "description": "Capture a PNG screenshot of the current page.", "inputSchema": schemars::schema_for!(TakeScreenshotArgs)},
        {"name": "batch_get_page_map", "description": "Fetch page maps for several URLs concurrently.", "inputSchema": schemars::schema_for!(BatchGetPageMapArgs)},
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ScreenshotOutput;
    use async_trait::async_trait;
    use tower::ServiceExt;

    struct FakeTools;

    #[async_trait]
    impl PageMapTools for FakeTools {
        async fn get_page_map(&self, url: Option<String>) -> String {
            format!("page map for {:?}", url)
        }
        async fn execute_action(&self, r#ref: u32, action: String, _value: Option<String>) -> String {
            format!("{action} on {ref}")
        }
        async fn navigate_back(&self) -> String {
            "went back".into()
        }
        async fn take_screenshot(&self, _full_page: bool) -> ScreenshotOutput {
            ScreenshotOutput { png: Some(vec![1, 2, 3]), text: "ok".into() }
        }
        async fn batch_get_page_map(&self, urls: Vec<String>, _concurrency: usize) -> String {
            format!("batched {} urls", urls.len())
        }
    }

    struct FakeProbe;
    impl HealthProbe for FakeProbe {
        fn browser_connected(&self) -> bool {
            true
        }
        fn is_draining(&self) -> bool {
            false
        }
        fn pool_connected_at_least_once(&self) -> bool {
            true
        }
    }

    fn make_app() -> Router {
        make_app_with(RateLimiter::new(1000.0, 100.0, 10000.0, 1000.0, 0.2), false, &[])
    }

    fn make_app_with(limiter: RateLimiter, require_tls: bool, trusted_proxies: &[String]) -> Router {
        let origins = vec!["http://localhost:*".to_string()];
        router(Arc::new(FakeTools), Arc::new(FakeProbe), Arc::new(limiter), &origins, require_tls, trusted_proxies)
    }

    fn mcp_request(body: Value, peer: SocketAddr) -> axum::extract::Request {
        let mut request = axum::http::Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    #[test]
    fn origin_matches_exact_and_port_wildcard() {
        assert!(origin_matches("http://localhost:*", "http://localhost:5173"));
        assert!(!origin_matches("http://localhost:*", "http://localhost"));
        assert!(!origin_matches("http://localhost:*", "http://evil.example.com:5173"));
        assert!(origin_matches("https://app.example.com", "https://app.example.com"));
        assert!(!origin_matches("https://app.example.com", "https://app.example.com.evil.test"));
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let app = make_app();
        let peer = SocketAddr::from(([127, 0, 0, 1], 9000));
        let request = mcp_request(json!({"jsonrpc": "2.0", "id": 1, "method": "bogus"}), peer);
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn allowed_request_carries_rate_limit_headers() {
        let app = make_app();
        let peer = SocketAddr::from(([127, 0, 0, 1], 9001));
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "execute_action"}});
        let response = app.oneshot(mcp_request(body, peer)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("ratelimit-limit"));
        assert!(response.headers().contains_key("ratelimit-remaining"));
        assert!(response.headers().contains_key("ratelimit-reset"));
    }

    #[tokio::test]
    async fn exhausted_bucket_denies_with_problem_json_and_skips_handler() {
        // capacity 10, cost 3: 3 calls allowed, the 4th denied.
        let limiter = RateLimiter::new(10.0, 0.0, 1000.0, 100.0, 0.2);
        let app = make_app_with(limiter, false, &[]);
        let peer = SocketAddr::from(([127, 0, 0, 1], 9002));
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "get_page_map"}});
        for _ in 0..3 {
            let response = app.clone().oneshot(mcp_request(body.clone(), peer)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.oneshot(mcp_request(body, peer)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], 429);
        assert_eq!(value["type"], "https://www.retio.ai/pagemap/errors/rate-limit-exceeded");
    }

    #[tokio::test]
    async fn tool_cost_is_read_from_the_buffered_body_not_hardcoded() {
        // capacity 2: execute_action (cost 1) must fit, get_page_map (cost 3) must not.
        let limiter = RateLimiter::new(2.0, 0.0, 1000.0, 100.0, 0.2);
        let app = make_app_with(limiter, false, &[]);
        let peer = SocketAddr::from(([127, 0, 0, 1], 9003));
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "execute_action"}});
        let response = app.oneshot(mcp_request(body, peer)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn handler_can_still_read_the_body_after_rate_limiting_replays_it() {
        let app = make_app();
        let peer = SocketAddr::from(([127, 0, 0, 1], 9004));
        let body = json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "navigate_back"}});
        let response = app.oneshot(mcp_request(body, peer)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["result"]["content"][0]["text"], "went back");
    }

    #[tokio::test]
    async fn plain_http_is_rejected_421_when_tls_required() {
        let limiter = RateLimiter::new(1000.0, 100.0, 10000.0, 1000.0, 0.2);
        let app = make_app_with(limiter, true, &[]);
        let peer = SocketAddr::from(([127, 0, 0, 1], 9005));
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "navigate_back"}});
        let response = app.oneshot(mcp_request(body, peer)).await.unwrap();
        assert_eq!(response.status(), StatusCode::MISDIRECTED_REQUEST);
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "https://www.retio.ai/pagemap/errors/tls-required");
    }

    #[tokio::test]
    async fn forwarded_proto_from_trusted_proxy_satisfies_tls_requirement() {
        let limiter = RateLimiter::new(1000.0, 100.0, 10000.0, 1000.0, 0.2);
        let proxy = SocketAddr::from(([127, 0, 0, 1], 9006));
        let app = make_app_with(limiter, true, &[proxy.ip().to_string()]);
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "navigate_back"}});
        let mut request = mcp_request(body, proxy);
        request.headers_mut().insert("x-forwarded-proto", HeaderValue::from_static("https"));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_present_on_health() {
        let app = make_app();
        let response = app
            .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }
}
