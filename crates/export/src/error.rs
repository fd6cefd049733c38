//! Export pipeline error types.

use thiserror::Error;

/// Errors from the export pipeline and the publisher.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("chain error: {0}")]
    Chain(#[from] fca_chain::ChainError),

    #[error("storage error: {0}")]
    Storage(#[from] fca_storage::StorageError),

    #[error("core error: {0}")]
    Core(#[from] fca_core::Error),

    #[error("compressor error: {0}")]
    Compressor(std::io::Error),

    #[error("pipe error: {0}")]
    Io(#[from] std::io::Error),

    #[error("incomplete export (remote connection lost?)")]
    IncompleteExport,

    #[error("export task failed: {0}")]
    TaskFailed(String),

    #[error("invalid retrieval endpoint: {0}")]
    InvalidRetrievalEndpoint(String),
}

/// Result type alias for export operations.
pub type ExportResult<T> = std::result::Result<T, ExportError>;
