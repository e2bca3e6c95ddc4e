//! Health check endpoint.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status; always `"ok"` while the process is alive.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Number of tunnel sessions currently registered (includes any
    /// mid-drain).
    pub active_tunnels: usize,
}

/// `GET /health` — no auth required, matching §6 (the public surface has
/// no unauthenticated probe of its own).
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_tunnels: state.registry.len(),
    })
}

/// Health check routes, merged at the router root.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_reports_zero_tunnels_when_empty() {
        let state = AppState::new(ServerConfig::default());
        let app = health_routes().with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "ok");
        assert_eq!(health.active_tunnels, 0);
        assert!(!health.version.is_empty());
    }
}
