//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::ratelimit::SharedRateLimiter;
use crate::registry::SessionRegistry;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// The live set of connected tunnel sessions (C2).
    pub registry: SessionRegistry,

    /// Per-IP rate limiter, built from `config.rate_limit` (ambient; see
    /// the rate limit config).
    pub rate_limiter: SharedRateLimiter,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let rate_limiter = crate::ratelimit::create_rate_limiter(config.rate_limit.requests_per_minute);
        Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
            rate_limiter,
        }
    }
}
