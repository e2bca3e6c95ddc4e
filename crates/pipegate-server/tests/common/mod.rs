//! Common test utilities for end-to-end tunnel scenarios (§8 S1-S6).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use pipegate_client::{Relay, RelayConfig};
use pipegate_server::{Server, ServerConfig};
use pipegate_types::ConnectionId;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use url::Url;

/// A PipeGate relay server running in the background on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server with the given config, bound to an available port.
    pub async fn start(config: ServerConfig) -> Result<Self> {
        let addr = find_available_port().await?;
        let config = config.with_bind_address(addr);
        let server = Server::new(config);

        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        let client = Client::new();
        wait_for_health(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            _handle: handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The tunnel handshake URL for `conn_id` (§4.5, §6).
    pub fn ws_url(&self, conn_id: ConnectionId) -> String {
        format!("ws://{}/{}", self.addr, conn_id)
    }

    /// A public request URL for `conn_id` and the given path (§4.4).
    pub fn public_url(&self, conn_id: ConnectionId, path: &str) -> String {
        format!("{}/{}{}", self.base_url(), conn_id, path)
    }

    /// Poll `/health` and return its reported `active_tunnels` count.
    pub async fn active_tunnels(&self) -> Result<usize> {
        let body: serde_json::Value = self
            .client
            .get(format!("{}/health", self.base_url()))
            .send()
            .await?
            .json()
            .await?;
        Ok(body["active_tunnels"].as_u64().unwrap_or(0) as usize)
    }

    /// Wait (bounded) until `active_tunnels` reaches `expected`.
    pub async fn wait_for_active_tunnels(&self, expected: usize) -> Result<()> {
        let result = timeout(Duration::from_secs(5), async {
            loop {
                if self.active_tunnels().await.unwrap_or(usize::MAX) == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        result.map_err(|_| anyhow::anyhow!("timed out waiting for active_tunnels == {expected}"))
    }
}

/// A throwaway local HTTP origin standing in for the tunneled service (C6's
/// "local origin"). Exposes `/hello` (§8 S1) and `/slow` (S5).
pub struct LocalOrigin {
    pub addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl LocalOrigin {
    pub async fn start() -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let router = axum::Router::new()
            .route("/hello", axum::routing::get(hello))
            .route("/slow", axum::routing::get(slow));

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            addr,
            _handle: handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

async fn hello() -> impl axum::response::IntoResponse {
    ([("content-type", "text/plain")], "hi")
}

async fn slow() -> impl axum::response::IntoResponse {
    tokio::time::sleep(Duration::from_secs(60)).await;
    "too late"
}

/// Spawn a `pipegate-client` relay (C6) tunneling `origin` through `server`
/// under `conn_id`, with reconnect disabled so test failures surface
/// directly instead of retrying silently.
pub fn spawn_relay(
    server: &TestServer,
    origin: &LocalOrigin,
    conn_id: ConnectionId,
    token: &str,
) -> JoinHandle<pipegate_client::Result<()>> {
    let config = RelayConfig::new(
        Url::parse(&origin.base_url()).unwrap(),
        Url::parse(&server.ws_url(conn_id)).unwrap(),
        token,
    )
    .with_reconnect(false);

    let relay = Relay::new(config).expect("relay config is valid");
    tokio::spawn(async move { relay.run().await })
}

async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

async fn wait_for_health(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{addr}/health");

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => anyhow::bail!("timed out waiting for server to start"),
    }
}
