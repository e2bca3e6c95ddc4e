//! Public HTTP + WebSocket relay server for PipeGate (C4, C5, C7).
//!
//! This crate accepts public HTTP requests on behalf of tunneled clients,
//! forwards them over a per-client WebSocket, and relays the client's reply
//! back to the original caller. See the top-level design notes for the full component
//! breakdown; this crate implements C2 (session registry), C3 (client
//! session), C4 (public HTTP handler), C5 (handshake/auth gate), and C7
//! (supervision & shutdown). C1 (wire codec) lives in `pipegate-types`; C6
//! (the client-side relay) lives in `pipegate-client`.
//!
//! # Example
//!
//! ```no_run
//! use pipegate_server::{Server, ServerConfig};
//!
//! # async fn example() -> pipegate_server::Result<()> {
//! let config = ServerConfig::new(Some("secret-token".to_string()))
//!     .with_bind_address("0.0.0.0:8080".parse().unwrap());
//!
//! let server = Server::new(config);
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod registry;
pub mod routes;
pub mod session;
pub mod state;

pub use auth::{AllowAllValidator, StaticTokenValidator, TokenValidator};
pub use config::{RateLimitConfig, ServerConfig, TlsConfig};
pub use error::{Result, ServerError, TunnelError};
pub use registry::SessionRegistry;
pub use session::{ClientSession, SessionState};
pub use state::AppState;

use std::net::SocketAddr;

use axum::{
    Router, middleware,
    routing::{any, get},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The PipeGate public relay server: the axum service that owns the
/// session registry and routes public HTTP traffic into the matching
/// tunnel (§2).
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server from a configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }

    /// Create a server from a pre-built application state (e.g. in tests,
    /// to share a registry across multiple `Server` instances).
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// The server's application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router: health probe, tunnel handshake, and the public
    /// catch-all, wrapped in rate limiting and request logging (§4.4, §4.5,
    /// §6.1).
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::health_routes())
            .route("/{conn_id}", get(routes::handshake_handler))
            .route("/{conn_id}/{*rest}", any(routes::public_handler))
            .layer(middleware::from_fn(ratelimit::request_logging_middleware))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                ratelimit::rate_limit_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server on its configured bind address until a shutdown
    /// signal arrives, then drain every active session (§4.7).
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for tests, where the
    /// configured address may already be taken).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let router = self.router();
        let registry = self.state.registry.clone();
        let drain_timeout = self.state.config.shutdown_drain_timeout;

        info!(%addr, "starting pipegate server");

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("failed to bind {addr}: {e}")))?;

        // `into_make_service_with_connect_info` populates the `ConnectInfo<SocketAddr>`
        // extension the per-IP rate limiter reads (§6.1); without it every
        // peer falls through to the loopback default.
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(format!("server error: {e}")))?;

        registry.drain_all(drain_timeout).await;

        Ok(())
    }

    /// The configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

/// Resolves once a Ctrl+C or (on unix) SIGTERM is received, for
/// `axum::serve`'s graceful-shutdown hook (§4.7).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received; draining active tunnel sessions");
}
