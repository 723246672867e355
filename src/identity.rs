//! Caller identity
//!
//! Callers identify themselves with the `X-User-Id` header. Requests without
//! one share [`DEFAULT_CLIENT_ID`], and with it a single admission bucket.

use hyper::HeaderMap;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity used when no `X-User-Id` header is sent
pub const DEFAULT_CLIENT_ID: &str = "default_user";

/// Resolve the client id from request headers. Non-ASCII header bytes are
/// decoded lossily, so each distinct value keeps its own identity.
pub fn resolve_client_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_ID_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string())
}
