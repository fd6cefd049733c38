//! Lease client error types.

use thiserror::Error;

/// Errors talking to the lease registry.
#[derive(Debug, Error)]
pub enum LockerError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid registry endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("rpc error from {method}: {message} (code {code})")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("unexpected rpc response for {method}: {reason}")]
    InvalidResponse { method: String, reason: String },
}

/// Result type alias for lease operations.
pub type LockerResult<T> = std::result::Result<T, LockerError>;
