//! The streaming export pipeline.
//!
//! Composes a node's chain-export stream through zstd compression and a
//! SHA-256 tee into an object-store streaming PUT, with live progress
//! accounting and lease renewal running concurrently with the upload, then
//! publishes the checksum manifest and the latest pointer.

pub mod error;
pub mod pipeline;
pub mod progress;
pub mod publish;
pub mod renew;

pub use error::{ExportError, ExportResult};
pub use pipeline::{run_export, DiscardSink, ExportOutcome, PipelineConfig};
pub use progress::Progress;
pub use publish::{checksum_body, join_retrieval_url, upload_checksum, upload_latest};
pub use renew::spawn_renewal;
