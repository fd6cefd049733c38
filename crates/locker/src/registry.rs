//! The in-memory lease registry.

use crate::wire::NodeLock;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

/// How long a lease lives without renewal.
pub const LEASE_TTL: Duration = Duration::seconds(60);

struct Lease {
    peer_id: String,
    expiry: OffsetDateTime,
    secret: String,
}

/// Registry of node leases. One mutex guards the collection; every mutation
/// purges expired entries before acting. Leases are not persisted across
/// restarts.
#[derive(Default)]
pub struct LeaseRegistry {
    leases: Mutex<Vec<Lease>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current live leases, expired entries purged.
    pub async fn fetch_locks(&self) -> Vec<NodeLock> {
        self.fetch_locks_at(OffsetDateTime::now_utc()).await
    }

    /// Acquire or renew the lease on `peer_id`.
    ///
    /// A matching secret extends the expiry; a different secret is rejected
    /// without disclosing the holder's secret or touching the expiry.
    pub async fn lock(&self, peer_id: &str, secret: &str) -> NodeLock {
        self.lock_at(peer_id, secret, OffsetDateTime::now_utc())
            .await
    }

    async fn fetch_locks_at(&self, now: OffsetDateTime) -> Vec<NodeLock> {
        let mut leases = self.leases.lock().await;
        purge_expired(&mut leases, now);

        leases
            .iter()
            .map(|lease| NodeLock {
                peer_id: lease.peer_id.clone(),
                expiry: lease.expiry,
                acquired: true,
            })
            .collect()
    }

    async fn lock_at(&self, peer_id: &str, secret: &str, now: OffsetDateTime) -> NodeLock {
        let mut leases = self.leases.lock().await;
        purge_expired(&mut leases, now);

        if let Some(lease) = leases.iter_mut().find(|l| l.peer_id == peer_id) {
            if lease.secret == secret {
                lease.expiry = now + LEASE_TTL;
                tracing::info!(peer = %lease.peer_id, expiry = %lease.expiry, "updated lock");
                return NodeLock {
                    peer_id: lease.peer_id.clone(),
                    expiry: lease.expiry,
                    acquired: true,
                };
            }

            tracing::info!(peer = %lease.peer_id, expiry = %lease.expiry, "lock failed");
            return NodeLock {
                peer_id: lease.peer_id.clone(),
                expiry: lease.expiry,
                acquired: false,
            };
        }

        let lease = Lease {
            peer_id: peer_id.to_string(),
            expiry: now + LEASE_TTL,
            secret: secret.to_string(),
        };
        tracing::info!(peer = %lease.peer_id, expiry = %lease.expiry, "new lock");

        let lock = NodeLock {
            peer_id: lease.peer_id.clone(),
            expiry: lease.expiry,
            acquired: true,
        };
        leases.push(lease);
        lock
    }
}

fn purge_expired(leases: &mut Vec<Lease>, now: OffsetDateTime) {
    leases.retain(|lease| {
        let live = now <= lease.expiry;
        if !live {
            tracing::info!(peer = %lease.peer_id, "expired");
        }
        live
    });
}
