//! Chain node access for the chain archiver.
//!
//! This crate provides:
//! - The `NodeClient` seam over a full-chain node's RPC surface
//! - An HTTP JSON-RPC implementation of that seam
//! - The consensus manager selecting a healthy node serving a target tipset

pub mod consensus;
pub mod error;
pub mod node;

pub use consensus::ConsensusManager;
pub use error::{ChainError, ChainResult};
pub use node::{wait_api, ExportStream, HttpNodeClient, NodeClient};
