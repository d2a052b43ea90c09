//! Health endpoints for the Room Controller.
//!
//! Provides Kubernetes-compatible health endpoints:
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (can we serve traffic?)
//! - `GET /status` - Room and peer counts as JSON
//!
//! The `/metrics` endpoint is served separately via `metrics-exporter-prometheus`.
//!
//! # Health State
//!
//! - `live`: Always true after startup (process is running)
//! - `ready`: True once the signaling listener is bound, false again when
//!   shutdown starts

use crate::actors::RoomRegistry;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health state for the Room Controller.
#[derive(Debug)]
pub struct HealthState {
    /// Whether the service is live (process running).
    live: AtomicBool,
    /// Whether the service is ready to serve traffic.
    ready: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    /// Mark the service as ready to serve traffic.
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark the service as not ready (e.g., during shutdown).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub rooms: usize,
    pub peers: usize,
    pub draining: bool,
}

#[derive(Clone)]
struct HealthContext {
    health: Arc<HealthState>,
    registry: RoomRegistry,
}

/// Create the health router with liveness, readiness and status endpoints.
///
/// # Endpoints
///
/// - `GET /health` - Returns 200 if process is running (liveness)
/// - `GET /ready` - Returns 200 if ready and not draining, 503 otherwise
/// - `GET /status` - Returns current room and peer counts
pub fn health_router(health_state: Arc<HealthState>, registry: RoomRegistry) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .route("/status", get(status_handler))
        .with_state(HealthContext {
            health: health_state,
            registry,
        })
}

async fn liveness_handler(State(ctx): State<HealthContext>) -> StatusCode {
    if ctx.health.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness_handler(State(ctx): State<HealthContext>) -> StatusCode {
    if ctx.health.is_ready() && !ctx.registry.is_draining() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn status_handler(State(ctx): State<HealthContext>) -> Json<StatusResponse> {
    let status = ctx.registry.status();
    Json(StatusResponse {
        rooms: status.rooms,
        peers: status.peers,
        draining: ctx.registry.is_draining(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::{RoomRegistry, RoomSettings};
    use crate::media::UnconfiguredEngine;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn test_registry() -> RoomRegistry {
        RoomRegistry::new(Arc::new(UnconfiguredEngine), RoomSettings::default())
    }

    async fn get_status(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");

        let response = app
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes()
            .to_vec();
        (status, body)
    }

    #[test]
    fn test_health_state_default() {
        let state = HealthState::new();
        assert!(state.is_live(), "Should be live by default");
        assert!(!state.is_ready(), "Should not be ready by default");
    }

    #[test]
    fn test_health_state_set_ready() {
        let state = HealthState::new();

        state.set_ready();
        assert!(state.is_ready(), "Should be ready after set_ready()");

        state.set_not_ready();
        assert!(
            !state.is_ready(),
            "Should not be ready after set_not_ready()"
        );
    }

    #[tokio::test]
    async fn test_health_router_liveness_endpoint() {
        let app = health_router(Arc::new(HealthState::new()), test_registry());
        let (status, _) = get_status(app, "/health").await;
        assert_eq!(status, StatusCode::OK, "/health should return 200 OK when live");
    }

    #[tokio::test]
    async fn test_health_router_readiness_endpoint_not_ready() {
        let app = health_router(Arc::new(HealthState::new()), test_registry());
        let (status, _) = get_status(app, "/ready").await;
        assert_eq!(
            status,
            StatusCode::SERVICE_UNAVAILABLE,
            "/ready should return 503 when not ready"
        );
    }

    #[tokio::test]
    async fn test_health_router_readiness_endpoint_ready() {
        let state = Arc::new(HealthState::new());
        state.set_ready();
        let app = health_router(state, test_registry());
        let (status, _) = get_status(app, "/ready").await;
        assert_eq!(status, StatusCode::OK, "/ready should return 200 when ready");
    }

    #[tokio::test]
    async fn test_readiness_unavailable_while_draining() {
        let state = Arc::new(HealthState::new());
        state.set_ready();
        let registry = test_registry();
        registry.shutdown().await;

        let app = health_router(state, registry);
        let (status, _) = get_status(app, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_endpoint_reports_counts() {
        let app = health_router(Arc::new(HealthState::new()), test_registry());
        let (status, body) = get_status(app, "/status").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["rooms"], 0);
        assert_eq!(json["peers"], 0);
        assert_eq!(json["draining"], false);
    }

    #[tokio::test]
    async fn test_health_router_unknown_path_returns_404() {
        let app = health_router(Arc::new(HealthState::new()), test_registry());
        let (status, _) = get_status(app, "/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND, "Unknown paths should return 404");
    }
}
