//! Snapshot naming and the descriptor produced by the export pipeline.

use crate::types::ChainEpoch;
use std::fmt;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

/// Timestamp layout embedded in object names, e.g. `2024_03_04T09_05_06Z`.
const NAME_TIMESTAMP: &[FormatItem<'_>] =
    format_description!("[year]_[month]_[day]T[hour]_[minute]_[second]Z");

/// The name of a snapshot, derived from its height and the wall-clock
/// instant that height was produced (not the confidence height).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotName {
    height: ChainEpoch,
    timestamp: OffsetDateTime,
}

impl SnapshotName {
    pub fn new(height: ChainEpoch, timestamp: OffsetDateTime) -> Self {
        Self { height, timestamp }
    }

    pub fn height(&self) -> ChainEpoch {
        self.height
    }

    /// The `<height>_<timestamp>` stem shared by all artifacts of a run.
    pub fn base(&self) -> crate::Result<String> {
        let ts = self
            .timestamp
            .to_offset(time::UtcOffset::UTC)
            .format(NAME_TIMESTAMP)?;
        Ok(format!("{}_{}", self.height, ts))
    }

    /// Filename of the compressed chain export.
    pub fn car_filename(&self) -> crate::Result<String> {
        Ok(format!("{}.car.zst", self.base()?))
    }

    /// Filename of the checksum manifest.
    pub fn checksum_filename(&self) -> crate::Result<String> {
        Ok(format!("{}.sha256sum", self.base()?))
    }
}

/// Object key of the latest pointer under `prefix`. The resolver reads the
/// same key, so the two must never drift.
pub fn latest_key(prefix: &str) -> String {
    format!("{prefix}latest")
}

/// Everything the publisher needs to know about a finished snapshot upload.
#[derive(Clone)]
pub struct SnapshotDescriptor {
    /// SHA-256 of the bytes written to the object store.
    pub digest: [u8; 32],
    /// Size of the stored object in bytes.
    pub byte_size: u64,
    /// Filename of the snapshot object (without prefix).
    pub filename: String,
    /// Object key the latest pointer is published under.
    pub latest_index_key: String,
    /// Public URL consumers retrieve the snapshot from.
    pub retrieval_url: String,
}

impl SnapshotDescriptor {
    /// Lowercase hex rendering of the digest.
    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for SnapshotDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotDescriptor")
            .field("digest", &self.digest_hex())
            .field("byte_size", &self.byte_size)
            .field("filename", &self.filename)
            .field("latest_index_key", &self.latest_index_key)
            .field("retrieval_url", &self.retrieval_url)
            .finish()
    }
}
