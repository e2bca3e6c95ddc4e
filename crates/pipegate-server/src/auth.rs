//! Handshake/auth gate (C5) — §4.5.
//!
//! Token validation is a pluggable predicate: the core never parses a JWT
//! itself, it only calls `TokenValidator::validate`. Two implementations
//! ship here; a JWT-backed one is a drop-in addition a deployer can supply
//! without touching the tunnel core.
//!
//! # Security
//!
//! [`StaticTokenValidator`] compares in constant time to prevent timing
//! attacks from leaking how many leading characters of the token matched.

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

/// A pluggable bearer-token validation predicate (§4.5).
///
/// Implementations receive the raw token string extracted from either the
/// `Authorization: Bearer` header or the `token` query parameter, and
/// return whether it is valid.
pub trait TokenValidator: Send + Sync + 'static {
    fn validate(&self, token: &str) -> bool;
}

/// Validates against a single configured shared secret, using a
/// constant-time comparison.
pub struct StaticTokenValidator {
    expected: String,
}

impl StaticTokenValidator {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate(&self, token: &str) -> bool {
        constant_time_eq(token, &self.expected)
    }
}

/// Accepts any token. Used when no token is configured (local development)
/// and in tests.
pub struct AllowAllValidator;

impl TokenValidator for AllowAllValidator {
    fn validate(&self, _token: &str) -> bool {
        true
    }
}

/// Compare two strings in constant time, avoiding a length-dependent
/// short-circuit that would leak how many characters matched.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a_bytes, b_bytes) = (a.as_bytes(), b.as_bytes());
    if a_bytes.len() != b_bytes.len() {
        // Still touch `a` so the branch taken doesn't itself leak timing
        // information beyond the length mismatch, which is unavoidable.
        let _ = a_bytes.ct_eq(a_bytes);
        return false;
    }
    a_bytes.ct_eq(b_bytes).into()
}

/// Error from extracting a bearer token out of a handshake request (§4.5
/// step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingToken;

/// Extract the bearer token per §4.5: `Authorization: Bearer <token>`
/// header first, else the `token` query parameter.
pub fn extract_token(headers: &HeaderMap, query: &str) -> Result<String, MissingToken> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION)
        && let Ok(value) = value.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Ok(token.to_string());
    }

    for pair in query.split('&') {
        if let Some(token) = pair.strip_prefix("token=") {
            return Ok(urlencoding_decode(token));
        }
    }

    Err(MissingToken)
}

/// Minimal percent-decoding for the `token` query parameter. Query strings
/// reaching this function come from axum's raw query, which is not
/// otherwise decoded for us at this layer.
fn urlencoding_decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let hi = chars.next();
                let lo = chars.next();
                if let (Some(hi), Some(lo)) = (hi, lo)
                    && let (Some(hi), Some(lo)) = (hi.to_digit(16), lo.to_digit(16))
                {
                    out.push(((hi * 16 + lo) as u8) as char);
                } else {
                    out.push('%');
                }
            }
            '+' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn constant_time_eq_rejects_mismatches_and_length_differences() {
        assert!(!constant_time_eq("secret", "wrong"));
        assert!(!constant_time_eq("short", "longer-secret"));
        assert!(!constant_time_eq("secret", "Secret"));
    }

    #[test]
    fn static_validator_accepts_only_configured_token() {
        let validator = StaticTokenValidator::new("right");
        assert!(validator.validate("right"));
        assert!(!validator.validate("wrong"));
    }

    #[test]
    fn allow_all_accepts_everything() {
        let validator = AllowAllValidator;
        assert!(validator.validate("anything"));
        assert!(validator.validate(""));
    }

    #[test]
    fn extract_token_prefers_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            extract_token(&headers, "token=from-query"),
            Ok("from-header".to_string())
        );
    }

    #[test]
    fn extract_token_falls_back_to_query_param() {
        let headers = HeaderMap::new();
        assert_eq!(
            extract_token(&headers, "token=from-query"),
            Ok("from-query".to_string())
        );
    }

    #[test]
    fn extract_token_missing_is_an_error() {
        let headers = HeaderMap::new();
        assert_eq!(extract_token(&headers, ""), Err(MissingToken));
    }
}
