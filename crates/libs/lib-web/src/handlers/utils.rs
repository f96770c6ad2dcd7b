//! # Handler Utilities
//!
//! Shared helpers for authenticated handlers.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use lib_auth::decode_jwt;
use lib_core::error::{AppError, Result};
use lib_core::Config;

/// Extract the authenticated user id from the `Authorization` header.
pub fn extract_user_id(headers: &HeaderMap, config: &Config) -> Result<i64> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let claims = decode_jwt(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::Unauthorized("Invalid token subject".to_string()))
}
