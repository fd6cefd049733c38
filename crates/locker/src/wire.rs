//! Wire types of the lease JSON-RPC contract.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A lease as reported over the wire.
///
/// Field names, including the misspelled `Aquired`, are part of the wire
/// contract and must not be corrected.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeLock {
    #[serde(rename = "PeerID")]
    pub peer_id: String,

    #[serde(rename = "Expiry", with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,

    #[serde(rename = "Aquired")]
    pub acquired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_names_are_stable() {
        let lock = NodeLock {
            peer_id: "12D3KooWExample".to_string(),
            expiry: OffsetDateTime::UNIX_EPOCH,
            acquired: true,
        };

        let json = serde_json::to_value(&lock).unwrap();
        assert_eq!(json["PeerID"], "12D3KooWExample");
        assert_eq!(json["Aquired"], true);
        assert_eq!(json["Expiry"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn round_trips_rfc3339_expiry() {
        let json = serde_json::json!({
            "PeerID": "p1",
            "Expiry": "2024-06-01T12:00:00Z",
            "Aquired": false,
        });

        let lock: NodeLock = serde_json::from_value(json).unwrap();
        assert!(!lock.acquired);
        assert_eq!(lock.expiry.unix_timestamp(), 1_717_243_200);
    }
}
