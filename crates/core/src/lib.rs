//! Core domain types and shared logic for the chain archiver.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Chain heights, tipset keys and the genesis tipset
//! - Scheduling arithmetic (expected height, snapshot height, run instants)
//! - Snapshot naming and the descriptor handed to the publisher
//! - TOML configuration types for the worker and the index resolver

pub mod config;
pub mod error;
pub mod schedule;
pub mod snapshot;
pub mod types;

pub use config::{ExportWorkerConfig, IndexServiceConfig, NodeEndpoint, S3ResolverConfig};
pub use error::{Error, Result};
pub use schedule::{expected_height_at, next_snapshot_height, time_at_height, BLOCK_TIME};
pub use snapshot::{latest_key, SnapshotDescriptor, SnapshotName};
pub use types::{ChainEpoch, GenesisTipset, Tipset, TipsetKey};
