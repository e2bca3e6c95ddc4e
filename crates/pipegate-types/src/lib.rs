//! Wire protocol types shared between the PipeGate server and client.
//!
//! A [`WireMessage`] is the JSON payload carried inside a single WebSocket
//! text frame. The `kind` tag distinguishes a [`RequestMessage`] (sent
//! server → client) from a [`ResponseMessage`] (client → server).

pub mod error;
pub mod message;

pub use error::{Error, Result};
pub use message::{
    ConnectionId, HOP_BY_HOP_HEADERS, Headers, RequestId, RequestMessage, ResponseMessage,
    WireMessage, decode, encode_request, encode_response, is_hop_by_hop,
};
