//! Chain identity types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A chain height, in epochs (blocks) since genesis. Signed, matching the
/// chain's own convention; arithmetic before genesis yields negative values.
pub type ChainEpoch = i64;

/// Opaque identity of a tipset. Comparable by equality and usable to request
/// an export of the chain state rooted at that tipset.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TipsetKey(String);

impl TipsetKey {
    /// Create a tipset key from its wire representation.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the wire representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TipsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TipsetKey({self})")
    }
}

impl fmt::Display for TipsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The chain's genesis tipset. Fetched once per run; immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisTipset {
    /// Identity of the genesis tipset.
    pub key: TipsetKey,
    /// Minimum block timestamp of the genesis tipset, in Unix seconds.
    pub min_timestamp: u64,
}

/// A tipset at a known height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tipset {
    /// Identity of the tipset.
    pub key: TipsetKey,
    /// Height of the tipset.
    pub height: ChainEpoch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tipset_key_equality() {
        let a = TipsetKey::new("bafy-a");
        let b = TipsetKey::new("bafy-a");
        let c = TipsetKey::new("bafy-c");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "bafy-a");
    }
}
