//! Server configuration (§6.1).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AllowAllValidator, StaticTokenValidator, TokenValidator};

/// Default dispatch deadline per §4.4 ("default 30 s; configurable").
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on a buffered public request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// TLS certificate/key paths. Loading the certificate material itself is an
/// external collaborator (§1, "TLS certificate loading") — this
/// struct only carries the configured paths through to that boundary.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub keyfile: PathBuf,
    pub certfile: PathBuf,
}

/// Per-IP rate limit configuration (§6.1).
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per minute allowed per source IP.
    pub requests_per_minute: u32,
    /// Enable rate limiting.
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 600,
            enabled: true,
        }
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the public HTTP + WebSocket listener to.
    pub bind_address: SocketAddr,

    /// Pluggable bearer-token validator for the handshake gate (§4.5).
    pub token_validator: Arc<dyn TokenValidator>,

    /// Dispatch deadline D for public requests (§4.4).
    pub request_timeout: Duration,

    /// Maximum buffered public request body size; requests over this limit
    /// are rejected with 413 (§4.4 SHOULD).
    pub max_body_bytes: usize,

    /// Optional TLS material paths.
    pub tls: Option<TlsConfig>,

    /// Per-IP rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Bounded deadline for graceful shutdown drain (§4.7).
    pub shutdown_drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".parse().unwrap(),
            token_validator: Arc::new(AllowAllValidator),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            tls: None,
            rate_limit: RateLimitConfig::default(),
            shutdown_drain_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Create a config validating tunnels against a single static shared
    /// secret. Pass `None` to run with no authentication (useful for local
    /// development and tests).
    pub fn new(client_token: Option<String>) -> Self {
        let token_validator: Arc<dyn TokenValidator> = match client_token {
            Some(token) => Arc::new(StaticTokenValidator::new(token)),
            None => Arc::new(AllowAllValidator),
        };
        Self {
            token_validator,
            ..Default::default()
        }
    }

    /// Use a custom token validator (e.g. a JWT-backed one; see §4.5).
    pub fn with_token_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.token_validator = validator;
        self
    }

    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_address", &self.bind_address)
            .field("request_timeout", &self.request_timeout)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("tls", &self.tls)
            .field("rate_limit", &self.rate_limit)
            .field("shutdown_drain_timeout", &self.shutdown_drain_timeout)
            .finish_non_exhaustive()
    }
}
