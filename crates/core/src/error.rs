//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid tipset key: {0}")]
    InvalidTipsetKey(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read {path}: {source}")]
    SecretFile {
        path: String,
        source: std::io::Error,
    },

    #[error("timestamp formatting error: {0}")]
    TimestampFormat(#[from] time::error::Format),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
