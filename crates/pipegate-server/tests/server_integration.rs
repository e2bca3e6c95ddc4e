//! End-to-end tunnel scenarios (§8: S1-S6).
//!
//! These tests drive a real `pipegate-server` against either a real
//! `pipegate-client` relay (S1, S5) or a raw WebSocket connection standing
//! in for one, where the scenario needs control the relay doesn't expose
//! (S3 auth failure, S4 conflicting connection ids, S6 an abrupt drop with
//! a request in flight).

mod common;

use std::time::Duration;

use anyhow::Result;
use common::{LocalOrigin, TestServer, spawn_relay};
use futures::{SinkExt, StreamExt};
use pipegate_server::ServerConfig;
use pipegate_types::ConnectionId;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

const TOKEN: &str = "right";

fn authed_request(url: &str, token: &str) -> tokio_tungstenite::tungstenite::http::Request<()> {
    let mut request = url.into_client_request().unwrap();
    request.headers_mut().insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    request
}

/// S1: happy path. A tunnel is registered; a public request is forwarded to
/// the local origin and the origin's reply is returned to the caller
/// unchanged.
#[tokio::test]
async fn s1_happy_path_round_trips_through_the_tunnel() -> Result<()> {
    let server = TestServer::start(ServerConfig::new(Some(TOKEN.to_string()))).await?;
    let origin = LocalOrigin::start().await?;
    let conn_id = ConnectionId::new();

    let relay = spawn_relay(&server, &origin, conn_id, TOKEN);
    server.wait_for_active_tunnels(1).await?;

    let response = reqwest::get(server.public_url(conn_id, "/hello?x=1")).await?;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain"
    );
    assert_eq!(response.text().await?, "hi");

    relay.abort();
    Ok(())
}

/// S2: no tunnel registered for the requested connection id.
#[tokio::test]
async fn s2_no_tunnel_returns_bad_gateway() -> Result<()> {
    let server = TestServer::start(ServerConfig::default()).await?;
    let conn_id = ConnectionId::new();

    let response = reqwest::get(server.public_url(conn_id, "/anything")).await?;
    assert_eq!(response.status(), 502);
    assert_eq!(response.text().await?, "tunnel not connected");

    Ok(())
}

/// S3: a handshake with the wrong bearer token is rejected with 401 before
/// any session is created; public requests to that id keep returning 502.
#[tokio::test]
async fn s3_auth_failure_rejects_handshake_before_registration() -> Result<()> {
    let server = TestServer::start(ServerConfig::new(Some(TOKEN.to_string()))).await?;
    let conn_id = ConnectionId::new();

    let request = authed_request(&server.ws_url(conn_id), "wrong");
    let err = connect_async(request).await.unwrap_err();
    let status = match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => response.status().as_u16(),
        other => panic!("expected an HTTP rejection, got {other:?}"),
    };
    assert_eq!(status, 401);

    let response = reqwest::get(server.public_url(conn_id, "/anything")).await?;
    assert_eq!(response.status(), 502);

    Ok(())
}

/// S4: two clients race for the same connection id; exactly one session
/// stays Active, the other is closed with application code 4409.
#[tokio::test]
async fn s4_conflicting_connection_id_closes_the_loser() -> Result<()> {
    let server = TestServer::start(ServerConfig::new(Some(TOKEN.to_string()))).await?;
    let conn_id = ConnectionId::new();

    let (first, _) = connect_async(authed_request(&server.ws_url(conn_id), TOKEN)).await?;
    server.wait_for_active_tunnels(1).await?;

    let (mut second, _) = connect_async(authed_request(&server.ws_url(conn_id), TOKEN)).await?;
    let close_code = match second.next().await {
        Some(Ok(Message::Close(Some(frame)))) => u16::from(frame.code),
        other => panic!("expected a close frame, got {other:?}"),
    };
    assert_eq!(close_code, 4409);

    assert_eq!(server.active_tunnels().await?, 1);
    drop(first);
    Ok(())
}

/// S5: the origin sleeps past the dispatch deadline. The public caller sees
/// 504 at roughly the deadline, and the session survives to serve the next
/// request normally.
#[tokio::test]
async fn s5_timeout_returns_504_and_session_stays_active() -> Result<()> {
    let config = ServerConfig::new(Some(TOKEN.to_string()))
        .with_request_timeout(Duration::from_millis(300));
    let server = TestServer::start(config).await?;
    let origin = LocalOrigin::start().await?;
    let conn_id = ConnectionId::new();

    let relay = spawn_relay(&server, &origin, conn_id, TOKEN);
    server.wait_for_active_tunnels(1).await?;

    let started = std::time::Instant::now();
    let response = reqwest::get(server.public_url(conn_id, "/slow")).await?;
    assert_eq!(response.status(), 504);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "504 should arrive close to the configured deadline"
    );

    assert_eq!(server.active_tunnels().await?, 1);

    let response = reqwest::get(server.public_url(conn_id, "/hello")).await?;
    assert_eq!(response.status(), 200);

    relay.abort();
    Ok(())
}

/// S6: the tunnel's socket closes abruptly while a request is in flight.
/// The waiting public caller gets 502, and the registry entry is removed.
#[tokio::test]
async fn s6_client_drop_fails_the_pending_request_and_unregisters() -> Result<()> {
    let server = TestServer::start(ServerConfig::new(Some(TOKEN.to_string()))).await?;
    let conn_id = ConnectionId::new();

    let (mut socket, _) = connect_async(authed_request(&server.ws_url(conn_id), TOKEN)).await?;
    server.wait_for_active_tunnels(1).await?;

    let public_url = server.public_url(conn_id, "/anything");
    let pending = tokio::spawn(async move { reqwest::get(public_url).await });

    // Read the forwarded request off the raw socket (so we know the server
    // is genuinely waiting on it), then drop the connection without ever
    // answering — the public caller's dispatch is left pending.
    match socket.next().await {
        Some(Ok(Message::Text(_))) => {}
        other => panic!("expected the forwarded request frame, got {other:?}"),
    }
    socket.close(None).await.ok();
    drop(socket);

    let response = pending.await??;
    assert_eq!(response.status(), 502);
    assert_eq!(response.text().await?, "tunnel closed");

    server.wait_for_active_tunnels(0).await?;
    Ok(())
}

/// Invariant 1 (§8): at most one session per connection id is ever
/// Active — re-asserted with a distinct id to rule out cross-test leakage.
#[tokio::test]
async fn unique_tunnel_per_connection_id() -> Result<()> {
    let server = TestServer::start(ServerConfig::new(Some(TOKEN.to_string()))).await?;
    let conn_id = ConnectionId::new();

    let (_a, _) = connect_async(authed_request(&server.ws_url(conn_id), TOKEN)).await?;
    server.wait_for_active_tunnels(1).await?;

    let (mut b, _) = connect_async(authed_request(&server.ws_url(conn_id), TOKEN)).await?;
    assert!(matches!(b.next().await, Some(Ok(Message::Close(_)))));
    assert_eq!(server.active_tunnels().await?, 1);

    Ok(())
}
