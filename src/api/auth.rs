//! Shared bearer-token authentication.
//!
//! The gateway accepts a single shared token. Tokens are compared by their
//! SHA-256 digests so the comparison does not depend on where the first
//! differing byte is.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::core::error::Result;
use crate::core::AppError;

/// Hash a token using SHA-256.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract Bearer token from Authorization header.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Verify the request against the configured gateway token.
///
/// With no token configured every request passes. Otherwise a matching
/// `Authorization: Bearer` header is required.
pub fn verify_auth(headers: &HeaderMap, expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = extract_bearer(headers).ok_or(AppError::Unauthorized)?;
    if hash_key(provided) != hash_key(expected) {
        tracing::debug!("Rejected request with wrong gateway token");
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
