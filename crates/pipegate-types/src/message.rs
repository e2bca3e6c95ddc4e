//! Wire codec (C1): the JSON-over-text-frame encoding of requests and
//! responses carried over the tunnel's WebSocket, and the `ConnectionId` /
//! `RequestId` identifiers used to address and correlate them.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// An opaque 128-bit tunnel identifier, rendered as a canonical UUID string
/// on the wire and in public request URLs. Equality is byte-exact on the
/// canonical form (derived, since `Uuid` compares its raw bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Generate a new random connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a connection id from its canonical UUID string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A per-session request identifier, minted by the server when a public
/// request is dispatched to a tunnel. Unique only within one session's
/// lifetime (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Mint a new request id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered list of header `(name, value)` pairs. A `Vec` rather than a
/// map preserves both order and duplicate names, as §3 requires.
pub type Headers = Vec<(String, String)>;

/// Hop-by-hop headers that must never be forwarded across either leg of the
/// tunnel (§4.4, §4.6). Comparison is case-insensitive.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// True if `name` is a hop-by-hop header, or `Host`, which §4.4 also
/// excludes when building the outbound [`RequestMessage`].
pub fn is_hop_by_hop(name: &str) -> bool {
    name.eq_ignore_ascii_case("host") || HOP_BY_HOP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// A request forwarded server → client (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub request_id: RequestId,
    pub method: String,
    /// The remainder of the URL after `/<conn-id>`, including leading `/`
    /// and query string, percent-encoding preserved.
    pub path: String,
    pub headers: Headers,
    /// Raw request body bytes (empty for bodyless requests).
    #[serde(skip)]
    pub body: Vec<u8>,
}

/// A response returned client → server (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub request_id: RequestId,
    pub status: u16,
    pub headers: Headers,
    #[serde(skip)]
    pub body: Vec<u8>,
}

/// The tagged union decoded from a single WebSocket text frame (§4.1, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Request(RequestMessage),
    Response(ResponseMessage),
}

// The on-the-wire JSON shape: `{"kind": "request"|"response", ..., "body": "<base64>"}`.
// `body` is base64 text on the wire but raw bytes in the Rust types above, so
// encoding/decoding goes through these private mirror structs rather than
// deriving Serialize/Deserialize directly on RequestMessage/ResponseMessage.

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireFrame {
    Request {
        request_id: RequestId,
        method: String,
        path: String,
        headers: Headers,
        body: String,
    },
    Response {
        request_id: RequestId,
        status: u16,
        headers: Headers,
        body: String,
    },
}

/// Encode a [`RequestMessage`] as a wire-format JSON string.
///
/// Deterministic for a given input: header order and duplicates are
/// preserved verbatim, and the body is base64-encoded (empty body → empty
/// string).
pub fn encode_request(msg: &RequestMessage) -> String {
    let frame = WireFrame::Request {
        request_id: msg.request_id,
        method: msg.method.clone(),
        path: msg.path.clone(),
        headers: msg.headers.clone(),
        body: BASE64.encode(&msg.body),
    };
    // A WireFrame serializes to a JSON object of plain strings/arrays; this
    // cannot fail.
    serde_json::to_string(&frame).expect("WireFrame serialization is infallible")
}

/// Encode a [`ResponseMessage`] as a wire-format JSON string. Same
/// discipline as [`encode_request`].
pub fn encode_response(msg: &ResponseMessage) -> String {
    let frame = WireFrame::Response {
        request_id: msg.request_id,
        status: msg.status,
        headers: msg.headers.clone(),
        body: BASE64.encode(&msg.body),
    };
    serde_json::to_string(&frame).expect("WireFrame serialization is infallible")
}

/// Decode a wire-format JSON string into a [`WireMessage`].
///
/// Fails with a codec [`Error`] on invalid JSON, an unknown `kind`, a
/// missing required field, an out-of-range `status`, or a base64 error in
/// `body`.
pub fn decode(s: &str) -> Result<WireMessage, Error> {
    // Decode via a generic probe first so an unrecognized `kind` value
    // produces our own UnknownKind error rather than serde's generic one.
    let value: serde_json::Value = serde_json::from_str(s)?;
    let kind = value
        .get("kind")
        .and_then(|k| k.as_str())
        .ok_or(Error::MissingField("kind"))?;

    match kind {
        "request" | "response" => {}
        other => return Err(Error::UnknownKind(other.to_string())),
    }

    let frame: WireFrame = serde_json::from_value(value)?;

    match frame {
        WireFrame::Request {
            request_id,
            method,
            path,
            headers,
            body,
        } => {
            let body = BASE64.decode(body.as_bytes())?;
            Ok(WireMessage::Request(RequestMessage {
                request_id,
                method,
                path,
                headers,
                body,
            }))
        }
        WireFrame::Response {
            request_id,
            status,
            headers,
            body,
        } => {
            if !(100..=599).contains(&status) {
                return Err(Error::StatusOutOfRange(status));
            }
            let body = BASE64.decode(body.as_bytes())?;
            Ok(WireMessage::Response(ResponseMessage {
                request_id,
                status,
                headers,
                body,
            }))
        }
    }
}
