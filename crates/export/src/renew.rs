//! Lease renewal concurrent with the upload.

use fca_locker::LeaseHandle;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Keep `lease` alive until `run` is cancelled.
///
/// Sleeps half the time to expiry between renewals, matching the registry's
/// TTL cadence. Renewal failures are logged and retried on the next tick;
/// the lease is only actually lost once the registry purges it.
pub fn spawn_renewal(mut lease: LeaseHandle, run: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let until_expiry = lease.expiry() - OffsetDateTime::now_utc();
            let wait = std::time::Duration::try_from(until_expiry / 2).unwrap_or_default();

            tokio::select! {
                _ = run.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }

            match lease.renew().await {
                Ok(true) => {
                    tracing::debug!(peer = lease.peer_id(), expiry = %lease.expiry(), "lock renewed");
                }
                Ok(false) => {
                    tracing::error!(peer = lease.peer_id(), "failed to acquire lock");
                }
                Err(err) => {
                    tracing::error!(peer = lease.peer_id(), error = %err, "error updating lock");
                }
            }
        }
    })
}
