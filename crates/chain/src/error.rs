//! Chain access error types.

use thiserror::Error;

/// Errors talking to chain nodes or agreeing on chain state.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid node address: {0}")]
    InvalidAddress(String),

    #[error("rpc error from {method}: {message} (code {code})")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("unexpected rpc response for {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("could not get genesis")]
    NoGenesis,

    #[error("no tipset consensus at height {0}")]
    NoTipsetConsensus(i64),

    #[error("could not get node")]
    NoEligibleNode,

    #[error("node is not online")]
    NodeOffline,
}

/// Result type alias for chain operations.
pub type ChainResult<T> = std::result::Result<T, ChainError>;
