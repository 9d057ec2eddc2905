//! Bearer token check for mutating endpoints

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::error::{ApiError, ApiResult};

const BEARER_PREFIX: &str = "Bearer ";

/// Reject the request unless it carries the configured token
///
/// With no token configured every request passes.
pub fn require_token(expected: Option<&str>, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let Some(supplied) = header.strip_prefix(BEARER_PREFIX) else {
        return Err(ApiError::Unauthorized("Missing bearer token".to_string()));
    };

    if supplied.trim() != expected {
        return Err(ApiError::Unauthorized("Invalid token".to_string()));
    }
    Ok(())
}
