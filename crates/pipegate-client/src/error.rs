//! Client relay error types (§7 `OriginError`, transport failures).

use thiserror::Error;

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the outbound tunnel relay (C6).
#[derive(Debug, Error)]
pub enum Error {
    /// The WebSocket transport to the server failed or was rejected.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Building the local HTTP client failed.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A configured URL did not parse.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The server sent a frame this relay does not expect (§4.6 step 2:
    /// "any other kind is a protocol error"). Fatal for the connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid relay configuration (e.g. a token that cannot be carried in
    /// a header value).
    #[error("configuration error: {0}")]
    Config(String),
}
