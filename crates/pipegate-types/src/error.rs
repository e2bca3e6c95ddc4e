//! Error types for the wire codec.

use thiserror::Error;

/// Result type alias using the codec error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from decoding or encoding a [`crate::WireMessage`].
#[derive(Debug, Error)]
pub enum Error {
    /// The frame was not valid JSON.
    #[error("malformed message: invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The frame's `kind` field was present but not `"request"` or `"response"`.
    #[error("malformed message: unknown kind {0:?}")]
    UnknownKind(String),

    /// A required field was missing or had the wrong shape for the frame's kind.
    #[error("malformed message: missing or invalid field {0:?}")]
    MissingField(&'static str),

    /// `status` was outside the 100–599 range required by the wire protocol.
    #[error("malformed message: status {0} out of range 100-599")]
    StatusOutOfRange(u16),

    /// `body` was not valid base64.
    #[error("malformed message: invalid base64 body: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}
