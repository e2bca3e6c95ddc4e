//! Per-IP rate limiting middleware, built on `governor`'s keyed limiter.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use serde::Serialize;

use crate::state::AppState;

/// Per-IP rate limiter type alias.
pub type PerIpRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

pub type SharedRateLimiter = Arc<PerIpRateLimiter>;

#[derive(Debug, Serialize)]
struct RateLimitError {
    error: String,
    code: u16,
    retry_after_seconds: u64,
}

/// Create a per-IP rate limiter for `requests_per_minute` (falls back to 60
/// if configured as zero).
pub fn create_rate_limiter(requests_per_minute: u32) -> SharedRateLimiter {
    let quota =
        Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::new(60).unwrap()));
    Arc::new(RateLimiter::keyed(quota))
}

/// Extract the client IP for rate-limit keying: `X-Forwarded-For`, then
/// `X-Real-IP`, then the socket's peer address, then localhost.
fn extract_client_ip(request: &Request<Body>) -> IpAddr {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
        && let Ok(ip) = first.trim().parse::<IpAddr>()
    {
        return ip;
    }

    if let Some(real_ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        && let Ok(ip) = real_ip.trim().parse::<IpAddr>()
    {
        return ip;
    }

    if let Some(connect_info) = request.extensions().get::<ConnectInfo<std::net::SocketAddr>>() {
        return connect_info.0.ip();
    }

    IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))
}

/// Rate limiting middleware applied to every route (public and tunnel).
pub async fn rate_limit_middleware(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    if !state.config.rate_limit.enabled {
        return next.run(request).await;
    }

    let client_ip = extract_client_ip(&request);

    match state.rate_limiter.check_key(&client_ip) {
        Ok(_) => next.run(request).await,
        Err(_not_until) => {
            let retry_after = 1u64;
            tracing::warn!(path = %request.uri().path(), %client_ip, "rate limit exceeded");

            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.to_string())],
                axum::Json(RateLimitError {
                    error: "rate limit exceeded".to_string(),
                    code: 429,
                    retry_after_seconds: retry_after,
                }),
            )
                .into_response()
        }
    }
}

/// Structured request logging, applied to every route (public and tunnel).
pub async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        tracing::error!(%method, %path, %status, duration_ms, "request completed with server error");
    } else if status.is_client_error() {
        tracing::warn!(%method, %path, %status, duration_ms, "request completed with client error");
    } else {
        tracing::info!(%method, %path, %status, duration_ms, "request completed");
    }

    response
}
