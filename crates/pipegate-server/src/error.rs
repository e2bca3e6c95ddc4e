//! Error taxonomy for the server (§7).
//!
//! [`TunnelError`] is the internal vocabulary used by the session/registry
//! (C2/C3): it never reaches an HTTP response directly. [`ServerError`] is
//! the edge-facing error (C4/C5) that maps the taxonomy onto the status
//! codes §6 specifies, and implements axum's `IntoResponse`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::MissingToken;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors internal to a tunnel session's dispatch/registry lifecycle (§7).
#[derive(Debug, Error, Clone)]
pub enum TunnelError {
    /// A second `Registering` session attempted to claim an occupied
    /// connection id (§3 invariant 1, §4.2).
    #[error("connection id already in use")]
    ConnIdInUse,

    /// No session is registered for the requested connection id.
    #[error("tunnel not connected")]
    TunnelNotConnected,

    /// The session terminated before or during dispatch (§4.3).
    #[error("tunnel closed")]
    TunnelClosed,

    /// The dispatch deadline elapsed before a response arrived (§4.3, §5).
    #[error("upstream timed out")]
    UpstreamTimeout,

    /// The wire codec rejected a frame (§4.1, §4.3).
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The WebSocket transport failed.
    #[error("transport error: {0}")]
    Io(String),
}

impl From<pipegate_types::Error> for TunnelError {
    fn from(e: pipegate_types::Error) -> Self {
        TunnelError::MalformedMessage(e.to_string())
    }
}

/// Edge-facing error, mapped to an HTTP status code by `IntoResponse`
/// (§4.4, §4.5, §6, §7).
///
/// §4.4 step 1 and §4.5 step 1 disagree on the status for an unparseable
/// `conn_id` (404 on the public path, 400 on the handshake path); both are
/// kept as distinct variants rather than collapsed into one (see
/// DESIGN.md).
#[derive(Debug, Error)]
pub enum ServerError {
    /// `conn_id` path segment did not parse as a UUID on the public HTTP
    /// surface (§4.4 step 1). → 404.
    #[error("no such tunnel")]
    NotFound,

    /// `conn_id` path segment did not parse as a UUID on the handshake
    /// surface (§4.5 step 1). → 400.
    #[error("malformed connection id")]
    MalformedConnId,

    /// Bearer token absent or invalid at handshake (§4.5 step 2). → 401.
    #[error("unauthorized")]
    Unauthorized,

    /// Buffered request body exceeded the configured cap (§4.4 SHOULD). →
    /// 413.
    #[error("payload too large")]
    PayloadTooLarge,

    /// Wrapped [`TunnelError`], mapped per §4.4 step 6 / §7.
    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    /// Anything else, surfaced as an opaque 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<MissingToken> for ServerError {
    fn from(_: MissingToken) -> Self {
        ServerError::Unauthorized
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ServerError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::NotFound => (StatusCode::NOT_FOUND, "no_such_tunnel"),
            ServerError::MalformedConnId => (StatusCode::BAD_REQUEST, "malformed_conn_id"),
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ServerError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ServerError::Tunnel(inner) => match inner {
                TunnelError::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
                TunnelError::TunnelNotConnected => {
                    (StatusCode::BAD_GATEWAY, "tunnel_not_connected")
                }
                TunnelError::TunnelClosed
                | TunnelError::ConnIdInUse
                | TunnelError::MalformedMessage(_)
                | TunnelError::Io(_) => (StatusCode::BAD_GATEWAY, "tunnel_closed"),
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(%status, code, error = %message, "public request failed");
        } else {
            tracing::warn!(%status, code, error = %message, "public request rejected");
        }

        // §4.4 step 2 and §8 S2/S6 specify these two bodies as the literal
        // plain-text strings a public caller is told to expect, not a JSON
        // envelope — every other error keeps the structured `ErrorBody`.
        match &self {
            ServerError::Tunnel(TunnelError::TunnelNotConnected) => {
                return (status, "tunnel not connected").into_response();
            }
            ServerError::Tunnel(TunnelError::TunnelClosed) => {
                return (status, "tunnel closed").into_response();
            }
            _ => {}
        }

        (
            status,
            Json(ErrorBody {
                code: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_errors_map_to_spec_status_codes() {
        assert_eq!(
            ServerError::from(TunnelError::UpstreamTimeout).status_and_code().0,
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ServerError::from(TunnelError::TunnelNotConnected)
                .status_and_code()
                .0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServerError::from(TunnelError::TunnelClosed).status_and_code().0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServerError::MalformedConnId.status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Unauthorized.status_and_code().0,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn tunnel_not_connected_body_is_the_literal_spec_string() {
        let response = ServerError::from(TunnelError::TunnelNotConnected).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, "tunnel not connected".as_bytes());
    }

    #[tokio::test]
    async fn tunnel_closed_body_is_the_literal_spec_string() {
        let response = ServerError::from(TunnelError::TunnelClosed).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, "tunnel closed".as_bytes());
    }
}
