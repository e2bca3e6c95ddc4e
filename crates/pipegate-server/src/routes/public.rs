//! Public HTTP handler (C4) — §4.4.
//!
//! Accepts any HTTP method on `/{conn_id}/{*rest}`, builds a
//! [`RequestMessage`], dispatches it over the matching session, and writes
//! the client's [`ResponseMessage`] back as the public HTTP response.

use axum::body::{Body, to_bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use pipegate_types::{ConnectionId, Headers, RequestId, RequestMessage, ResponseMessage, is_hop_by_hop};

use crate::error::{ServerError, TunnelError};
use crate::state::AppState;

/// `ANY /{conn_id}/{*rest}` (§4.4, §6).
pub async fn public_handler(
    State(state): State<AppState>,
    Path((conn_id, rest)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
    body: Body,
) -> Response {
    match handle(&state, &conn_id, &rest, &method, &headers, &uri, body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn handle(
    state: &AppState,
    conn_id_raw: &str,
    rest: &str,
    method: &Method,
    headers: &HeaderMap,
    uri: &Uri,
    body: Body,
) -> Result<Response, ServerError> {
    // Step 1: parse conn_id, 404 on failure (§4.4 step 1).
    let conn_id = ConnectionId::parse(conn_id_raw).map_err(|_| ServerError::NotFound)?;

    // Step 2: look up the session, 502 on miss (§4.4 step 2).
    let session = state
        .registry
        .lookup(conn_id)
        .ok_or(TunnelError::TunnelNotConnected)?;

    // Step 3: build the RequestMessage.
    let path = build_path(rest, uri.query());
    let forwarded_headers = forward_headers(headers);

    let body = to_bytes(body, state.config.max_body_bytes)
        .await
        .map_err(|_| ServerError::PayloadTooLarge)?;

    let msg = RequestMessage {
        request_id: RequestId::new(),
        method: method.to_string(),
        path,
        headers: forwarded_headers,
        body: body.to_vec(),
    };

    // Step 4: dispatch with the configured deadline.
    let response = session
        .dispatch(msg, state.config.request_timeout, &state.registry)
        .await?;

    // Steps 5-6: write the response (error mapping happens via `?` above
    // through `From<TunnelError> for ServerError`).
    Ok(build_response(response))
}

/// The remainder of the URL after `/<conn-id>`, including leading `/` and
/// query string, percent-encoding preserved (§3 `RequestMessage::path`).
fn build_path(rest: &str, query: Option<&str>) -> String {
    let mut path = format!("/{rest}");
    if let Some(query) = query
        && !query.is_empty()
    {
        path.push('?');
        path.push_str(query);
    }
    path
}

/// Copy headers in order, excluding hop-by-hop headers and `Host` (§4.4
/// step 3). `HeaderMap::iter` preserves both order and duplicate names.
fn forward_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Write the client's response back as the public HTTP reply (§4.4 step 5),
/// excluding hop-by-hop headers on this leg too (§4.4, §8 invariant 5).
fn build_response(msg: ResponseMessage) -> Response {
    let status = StatusCode::from_u16(msg.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in msg.headers.iter().filter(|(name, _)| !is_hop_by_hop(name)) {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(msg.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
