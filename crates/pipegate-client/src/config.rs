//! Client relay configuration (§6.1, §6.2 `pipegate connect`).

use std::time::Duration;

use url::Url;

/// Default timeout for a single request issued against the local origin.
pub const DEFAULT_ORIGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for one outbound tunnel relay (§4.6).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Base URL of the local origin being tunneled, e.g. `http://127.0.0.1:9090`.
    pub local_url: Url,
    /// The PipeGate server's WebSocket URL, including the connection id,
    /// e.g. `ws://example.com/aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa`.
    pub server_url: Url,
    /// Bearer token presented at handshake (§4.5).
    pub token: String,
    /// Reconnect with exponential backoff on connection loss (§4.6 step 5,
    /// §4.7). Not part of the core protocol contract; an optional outer
    /// supervisor concern.
    pub reconnect: bool,
    /// Per-request timeout against the local origin.
    pub origin_timeout: Duration,
}

impl RelayConfig {
    /// Construct a config with sensible defaults: reconnect enabled, a 30s
    /// origin timeout.
    pub fn new(local_url: Url, server_url: Url, token: impl Into<String>) -> Self {
        Self {
            local_url,
            server_url,
            token: token.into(),
            reconnect: true,
            origin_timeout: DEFAULT_ORIGIN_TIMEOUT,
        }
    }

    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_origin_timeout(mut self, timeout: Duration) -> Self {
        self.origin_timeout = timeout;
        self
    }
}
