//! Health/readiness probes (§6.2, §4.14). Mounted alongside the MCP route
//! when `transport=http`; meaningless (and unmounted) under stdio.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::dispatcher::HealthProbe;

#[derive(Clone)]
struct HealthState {
    probe: Arc<dyn HealthProbe>,
    transport: &'static str,
}

pub fn router(probe: Arc<dyn HealthProbe>, transport: &'static str) -> Router {
    let state = HealthState { probe, transport };
    Router::new()
        .route("/health", get(health))
        .route("/livez", get(livez))
        .route("/ready", get(ready))
        .route("/readyz", get(readyz))
        .route("/startupz", get(startupz))
        .with_state(state)
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "transport": state.transport}))
}

async fn livez() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn ready(State(state): State<HealthState>) -> impl IntoResponse {
    if state.transport == "http" && !state.probe.browser_connected() {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "unready", "browser_connected": false}))).into_response()
    } else {
        (StatusCode::OK, Json(json!({"status": "ok", "browser_connected": state.probe.browser_connected()}))).into_response()
    }
}

async fn readyz(State(state): State<HealthState>) -> impl IntoResponse {
    if state.probe.is_draining() {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "draining"}))).into_response()
    } else if state.transport == "http" && !state.probe.browser_connected() {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "unready"}))).into_response()
    } else {
        (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
    }
}

async fn startupz(State(state): State<HealthState>) -> impl IntoResponse {
    if state.probe.pool_connected_at_least_once() {
        (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "starting"}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    struct FakeProbe {
        connected: AtomicBool,
        draining: AtomicBool,
        ever_connected: AtomicBool,
    }

    impl HealthProbe for FakeProbe {
        fn browser_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
        fn is_draining(&self) -> bool {
            self.draining.load(Ordering::SeqCst)
        }
        fn pool_connected_at_least_once(&self) -> bool {
            self.ever_connected.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn ready_is_503_when_browser_disconnected_under_http() {
        let probe = Arc::new(FakeProbe {
            connected: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
        });
        let app = router(probe, "http");
        let response = app
            .oneshot(axum::http::Request::builder().uri("/ready").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn readyz_is_503_when_draining() {
        let probe = Arc::new(FakeProbe {
            connected: AtomicBool::new(true),
            draining: AtomicBool::new(true),
            ever_connected: AtomicBool::new(true),
        });
        let app = router(probe, "http");
        let response = app
            .oneshot(axum::http::Request::builder().uri("/readyz").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn livez_is_always_ok() {
        let probe = Arc::new(FakeProbe {
            connected: AtomicBool::new(false),
            draining: AtomicBool::new(true),
            ever_connected: AtomicBool::new(false),
        });
        let app = router(probe, "http");
        let response = app
            .oneshot(axum::http::Request::builder().uri("/livez").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
