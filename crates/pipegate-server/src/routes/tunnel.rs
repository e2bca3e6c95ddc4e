//! Handshake/auth gate (C5) — §4.5.
//!
//! `GET /{conn_id}` with `Upgrade: websocket` is the tunnel establishment
//! endpoint. The bearer token is checked *before* the WebSocket accept;
//! only once that passes and the connection id is successfully claimed in
//! the registry does the session start running its reader loop.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::{info, warn};

use pipegate_types::ConnectionId;

use crate::auth::extract_token;
use crate::error::ServerError;
use crate::session::ClientSession;
use crate::state::AppState;

/// Application-defined close code for a connection id already in use
/// (§4.5 step 4, §6, §8 S4).
const CLOSE_CODE_CONN_ID_IN_USE: u16 = 4409;

/// `GET /{conn_id}` (§4.5, §6).
pub async fn handshake_handler(
    State(state): State<AppState>,
    Path(conn_id_raw): Path<String>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> Response {
    let query = query.unwrap_or_default();
    match pre_upgrade(&state, &conn_id_raw, &headers, &query) {
        Ok(conn_id) => ws.on_upgrade(move |socket| run_session(socket, conn_id, state)),
        Err(e) => e.into_response(),
    }
}

/// Steps 1-2 of §4.5: parse `conn_id` and validate the bearer token, before
/// any WebSocket accept happens.
fn pre_upgrade(
    state: &AppState,
    conn_id_raw: &str,
    headers: &HeaderMap,
    query: &str,
) -> Result<ConnectionId, ServerError> {
    let conn_id = ConnectionId::parse(conn_id_raw).map_err(|_| ServerError::MalformedConnId)?;

    let token = extract_token(headers, query)?;
    if !state.config.token_validator.validate(&token) {
        return Err(ServerError::Unauthorized);
    }

    Ok(conn_id)
}

/// Steps 3-5 of §4.5, run after the WebSocket accept completes: construct
/// the session, claim the connection id, then run its reader until the
/// tunnel disconnects.
async fn run_session(socket: axum::extract::ws::WebSocket, conn_id: ConnectionId, state: AppState) {
    let (sink, stream) = socket.split();
    let session = ClientSession::new(conn_id, sink);

    if state.registry.try_register(conn_id, session.clone()).is_err() {
        warn!(%conn_id, "connection id already in use; rejecting new tunnel");
        session
            .reject_with_close_code(CLOSE_CODE_CONN_ID_IN_USE, "connection id already in use")
            .await;
        return;
    }

    session.mark_active();
    info!(%conn_id, "tunnel established");

    // Runs until the socket closes or errors; drains and unregisters
    // itself internally on every exit path (§4.3 `begin_drain`).
    session.run_reader(stream, state.registry.clone()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::state::AppState;
    use axum::http::HeaderMap;

    fn state_with_token(token: &str) -> AppState {
        AppState::new(ServerConfig::new(Some(token.to_string())))
    }

    #[test]
    fn pre_upgrade_rejects_malformed_conn_id() {
        let state = state_with_token("right");
        let err = pre_upgrade(&state, "not-a-uuid", &HeaderMap::new(), "token=right").unwrap_err();
        assert!(matches!(err, ServerError::MalformedConnId));
    }

    #[test]
    fn pre_upgrade_rejects_wrong_token() {
        let state = state_with_token("right");
        let conn_id = ConnectionId::new();
        let err = pre_upgrade(&state, &conn_id.to_string(), &HeaderMap::new(), "token=wrong")
            .unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized));
    }

    #[test]
    fn pre_upgrade_accepts_matching_token() {
        let state = state_with_token("right");
        let conn_id = ConnectionId::new();
        let accepted = pre_upgrade(&state, &conn_id.to_string(), &HeaderMap::new(), "token=right")
            .unwrap();
        assert_eq!(accepted, conn_id);
    }
}
