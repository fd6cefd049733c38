//! Snapshot scheduling arithmetic.
//!
//! Pure functions turning wall-clock time and chain parameters into snapshot
//! heights and launch instants. These are the only place height arithmetic
//! occurs; callers never hand-roll the formulas.

use crate::types::{ChainEpoch, GenesisTipset};
use time::{Duration, OffsetDateTime};

/// The chain's block time.
pub const BLOCK_TIME: Duration = Duration::seconds(30);

/// The epoch the chain is expected to have reached at `now`.
pub fn expected_height_at(
    genesis: &GenesisTipset,
    now: OffsetDateTime,
    block_time: Duration,
) -> ChainEpoch {
    let genesis_at = genesis_time(genesis);
    (now - genesis_at).whole_seconds() / block_time.whole_seconds()
}

/// The wall-clock instant at which `height` is produced.
pub fn time_at_height(
    genesis: &GenesisTipset,
    height: ChainEpoch,
    block_time: Duration,
) -> OffsetDateTime {
    genesis_time(genesis) + Duration::seconds(height * block_time.whole_seconds())
}

/// The next snapshot height for `current`.
///
/// The candidate is the first multiple of `interval` at or after
/// `current + 1`. Without an explicit after-hint, the just-passed boundary is
/// preferred while the chain has not yet produced `confidence` epochs past
/// the candidate:
///
/// ```text
///              /- 500
///   |----------|----------|----------|----------|
///           |----------|
///     485 - /          \ - 585
/// ```
pub fn next_snapshot_height(
    current: ChainEpoch,
    interval: ChainEpoch,
    confidence: ChainEpoch,
    after_hint: bool,
) -> ChainEpoch {
    let candidate = ((current + interval) / interval) * interval;
    if current + confidence < candidate && !after_hint {
        return candidate - interval;
    }

    candidate
}

fn genesis_time(genesis: &GenesisTipset) -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH + Duration::seconds(genesis.min_timestamp as i64)
}
