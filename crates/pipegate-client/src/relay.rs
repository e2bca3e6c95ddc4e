//! Client-side relay (C6) — §4.6.
//!
//! An outer reconnect loop with exponential backoff wraps an inner loop
//! that reads frames off the WebSocket and fans each request out to an
//! independent task, while outbound frames are serialized through a mutex
//! around the sink.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use reqwest::Client as HttpClient;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use url::Url;

use pipegate_types::{Headers, RequestId, RequestMessage, ResponseMessage, WireMessage, is_hop_by_hop};

use crate::config::RelayConfig;
use crate::error::{Error, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Drives one outbound tunnel connection: connects to the server, reads
/// `RequestMessage` frames, issues each against the local origin, and
/// writes back `ResponseMessage` frames (§4.6).
pub struct Relay {
    config: RelayConfig,
    http: HttpClient,
}

impl Relay {
    /// Build a relay for `config`. Fails only if the underlying HTTP
    /// client cannot be constructed.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.origin_timeout)
            .build()?;
        Ok(Self { config, http })
    }

    /// Run the relay until a clean server close or (when
    /// `config.reconnect` is false) the first fatal error. With reconnect
    /// enabled, connection loss is retried with exponential backoff — an
    /// outer-supervisor concern the core protocol does not require (§4.6
    /// step 5, §4.7, §9 open question on reconnection).
    pub async fn run(&self) -> Result<()> {
        let mut attempt: u32 = 0;
        let max_backoff = Duration::from_secs(30);

        loop {
            match self.connect_and_serve().await {
                Ok(()) => {
                    info!("tunnel closed");
                    return Ok(());
                }
                Err(e) if !self.config.reconnect => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let backoff = std::cmp::min(
                        Duration::from_millis(100 * 2u64.saturating_pow(attempt.min(10))),
                        max_backoff,
                    );
                    warn!(
                        error = %e,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "tunnel connection lost; reconnecting"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// One connection attempt: open the WebSocket presenting the bearer
    /// token (§4.6 step 1), then loop reading and fanning out requests
    /// (§4.6 steps 2-3) until the socket closes or a protocol error occurs.
    async fn connect_and_serve(&self) -> Result<()> {
        let mut request = self.config.server_url.as_str().into_client_request()?;
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.token))
                .map_err(|_| Error::Config("token is not a valid header value".to_string()))?,
        );

        info!(url = %self.config.server_url, "connecting to tunnel server");
        let (ws_stream, _response) = connect_async(request).await?;
        info!("tunnel established");

        let (sink, mut stream) = ws_stream.split();
        let sink: Arc<Mutex<WsSink>> = Arc::new(Mutex::new(sink));

        loop {
            let frame = match stream.next().await {
                Some(Ok(Message::Text(text))) => text.to_string(),
                Some(Ok(Message::Binary(_))) => {
                    return Err(Error::Protocol("unexpected binary frame from server".into()));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Err(e)) => return Err(Error::WebSocket(e)),
            };

            match pipegate_types::decode(&frame) {
                Ok(WireMessage::Request(msg)) => self.spawn_request(msg, sink.clone()),
                Ok(WireMessage::Response(_)) => {
                    return Err(Error::Protocol("server sent a response frame".into()));
                }
                Err(e) => return Err(Error::Protocol(e.to_string())),
            }
        }
    }

    /// Fan a single request out to its own task so concurrent requests on
    /// the same tunnel don't block each other (§4.6 step 3, §5).
    fn spawn_request(&self, msg: RequestMessage, sink: Arc<Mutex<WsSink>>) {
        let http = self.http.clone();
        let local_url = self.config.local_url.clone();

        tokio::spawn(async move {
            let request_id = msg.request_id;
            let response = forward_to_origin(&http, &local_url, msg).await;
            let encoded = pipegate_types::encode_response(&response);

            let mut sink = sink.lock().await;
            if let Err(e) = sink.send(Message::Text(encoded.into())).await {
                error!(%request_id, error = %e, "failed to send response upstream");
            }
        });
    }
}

/// Issue `msg` against `local_url` and build the `ResponseMessage` to send
/// back (§4.6 steps 3-4). Origin errors never propagate out of this
/// function; they become a 502 diagnostic response instead.
async fn forward_to_origin(http: &HttpClient, local_url: &Url, msg: RequestMessage) -> ResponseMessage {
    let request_id = msg.request_id;

    let url = match build_origin_url(local_url, &msg.path) {
        Ok(url) => url,
        Err(e) => return origin_error_response(request_id, &e.to_string()),
    };

    let method = match reqwest::Method::from_bytes(msg.method.as_bytes()) {
        Ok(method) => method,
        Err(_) => return origin_error_response(request_id, &format!("invalid method {:?}", msg.method)),
    };

    debug!(%request_id, %method, %url, "forwarding request to local origin");

    let mut builder = http.request(method, url).body(msg.body);
    for (name, value) in msg.headers.iter().filter(|(name, _)| !is_hop_by_hop(name)) {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.send().await {
        Ok(response) => build_response_message(request_id, response).await,
        Err(e) => origin_error_response(request_id, &e.to_string()),
    }
}

async fn build_response_message(request_id: RequestId, response: reqwest::Response) -> ResponseMessage {
    let status = response.status().as_u16();
    let headers: Headers = response
        .headers()
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();
    let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();

    ResponseMessage {
        request_id,
        status,
        headers,
        body,
    }
}

/// A local-origin error (connection refused, DNS failure, timeout) becomes
/// a 502 with a short diagnostic body (§4.6 step 4, §7 `OriginError`).
fn origin_error_response(request_id: RequestId, diagnostic: &str) -> ResponseMessage {
    ResponseMessage {
        request_id,
        status: 502,
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: format!("origin error: {diagnostic}").into_bytes(),
    }
}

fn build_origin_url(local_url: &Url, path: &str) -> std::result::Result<Url, url::ParseError> {
    let mut joined = local_url.as_str().trim_end_matches('/').to_string();
    joined.push_str(path);
    Url::parse(&joined)
}
