//! Node reservation (lease) registry and client.
//!
//! Snapshot workers reserve a node by peer identity before stressing it with
//! an export. Leases are time-bounded, renewable with a per-worker secret,
//! and live only in the registry process's memory.

pub mod client;
pub mod error;
pub mod registry;
pub mod wire;

pub use client::{LeaseHandle, LockerClient};
pub use error::{LockerError, LockerResult};
pub use registry::{LeaseRegistry, LEASE_TTL};
pub use wire::NodeLock;
