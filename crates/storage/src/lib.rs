//! Object storage abstraction and backends for the chain archiver.
//!
//! This crate provides:
//! - The `ObjectStore` seam the export pipeline and the index resolver share
//! - Streaming PUT with unknown Content-Length (`StreamingUpload`)
//! - Backends: S3-compatible stores and the local filesystem (dev/test)

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{ObjectMeta, ObjectStore, PutOptions, StreamingUpload};
