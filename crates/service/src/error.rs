//! Service error types.

use thiserror::Error;

/// Errors from service setup and operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] fca_storage::StorageError),

    #[error("core error: {0}")]
    Core(#[from] fca_core::Error),

    #[error("resolved object is empty: {0}")]
    EmptyPointer(String),

    #[error("unknown log subsystem: {0}")]
    UnknownSubsystem(String),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("log filter error: {0}")]
    LogFilter(String),
}

/// Result type alias for service operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
