//! Shared request helpers.

use axum::http::{HeaderMap, Uri};
use std::collections::HashMap;

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Find the admin credential on a request.
///
/// Checked in order: `Authorization: Bearer`, `X-Admin-Key`, and the
/// `api_key` query parameter used by older clients.
pub fn extract_admin_key(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token.to_string());
    }

    if let Some(key) = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Some(key.to_string());
    }

    axum::extract::Query::<HashMap<String, String>>::try_from_uri(uri)
        .ok()
        .and_then(|q| q.0.get("api_key").cloned())
        .filter(|s| !s.trim().is_empty())
}
