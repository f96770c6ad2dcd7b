//! # Authentication Library
//!
//! Password hashing and JWT token management.

pub mod pwd;
pub mod token;

// Re-export commonly used types
pub use pwd::{hash_password, verify_password};
pub use token::{decode_jwt, encode_jwt, Claims};

use thiserror::Error;

/// Errors produced by password hashing and token handling.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Password must be at least 8 characters long")]
    WeakPassword,

    #[error("Failed to hash password: {0}")]
    Hash(String),

    #[error("Invalid password hash: {0}")]
    InvalidHash(String),

    #[error("Failed to encode JWT: {0}")]
    TokenEncode(String),

    #[error("Failed to decode JWT: {0}")]
    TokenDecode(String),
}
