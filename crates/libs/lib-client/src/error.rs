//! # Client Errors

use thiserror::Error;

/// Errors surfaced by the client library.
///
/// Transport problems on the push channel are not fatal to a chat view;
/// the driver reacts by degrading to the polling path.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}
