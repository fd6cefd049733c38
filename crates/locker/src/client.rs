//! Lease registry client.

use crate::error::{LockerError, LockerResult};
use crate::wire::NodeLock;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::OffsetDateTime;
use url::Url;

const SECRET_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const SECRET_LEN: usize = 10;

/// The worker's identity towards the registry for the process lifetime.
fn random_secret() -> String {
    let mut rng = rand::thread_rng();
    (0..SECRET_LEN)
        .map(|_| SECRET_CHARSET[rng.gen_range(0..SECRET_CHARSET.len())] as char)
        .collect()
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

async fn rpc_call<T: DeserializeOwned>(
    http: &reqwest::Client,
    rpc_url: &Url,
    method: &str,
    params: serde_json::Value,
) -> LockerResult<T> {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 0,
    });

    let response: RpcResponse<T> = http
        .post(rpc_url.clone())
        .json(&body)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    if let Some(err) = response.error {
        return Err(LockerError::Rpc {
            method: method.to_string(),
            code: err.code,
            message: err.message,
        });
    }

    response.result.ok_or_else(|| LockerError::InvalidResponse {
        method: method.to_string(),
        reason: "missing result".to_string(),
    })
}

/// Client of the lease registry's service endpoint.
pub struct LockerClient {
    http: reqwest::Client,
    rpc_url: Url,
    secret: String,
}

impl LockerClient {
    /// Create a client for the registry at `endpoint` and generate this
    /// worker's secret.
    pub fn new(endpoint: &str) -> LockerResult<Self> {
        let base = Url::parse(endpoint)
            .map_err(|e| LockerError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let rpc_url = base
            .join("rpc/v0")
            .map_err(|e| LockerError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            http: reqwest::Client::new(),
            rpc_url,
            secret: random_secret(),
        })
    }

    /// Peer ids currently reserved by any worker.
    pub async fn locked_peers(&self) -> LockerResult<Vec<String>> {
        let locks: Vec<NodeLock> = rpc_call(
            &self.http,
            &self.rpc_url,
            "NodeLocker.FetchLocks",
            serde_json::json!([]),
        )
        .await?;

        Ok(locks.into_iter().map(|lock| lock.peer_id).collect())
    }

    /// Try to reserve `peer_id`. Returns `None` when another worker holds it.
    pub async fn lock(&self, peer_id: &str) -> LockerResult<Option<LeaseHandle>> {
        let mut handle = LeaseHandle {
            http: self.http.clone(),
            rpc_url: self.rpc_url.clone(),
            peer_id: peer_id.to_string(),
            secret: self.secret.clone(),
            expiry: OffsetDateTime::UNIX_EPOCH,
        };

        if handle.renew().await? {
            Ok(Some(handle))
        } else {
            Ok(None)
        }
    }
}

/// A held lease. Renewing re-submits the worker's secret and adopts the
/// server-reported expiry.
pub struct LeaseHandle {
    http: reqwest::Client,
    rpc_url: Url,
    peer_id: String,
    secret: String,
    expiry: OffsetDateTime,
}

impl LeaseHandle {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn expiry(&self) -> OffsetDateTime {
        self.expiry
    }

    /// Renew the lease. Returns the server's acquired flag; false means the
    /// registry purged the lease and another worker claimed the peer.
    pub async fn renew(&mut self) -> LockerResult<bool> {
        let lock: NodeLock = rpc_call(
            &self.http,
            &self.rpc_url,
            "NodeLocker.Lock",
            serde_json::json!([self.peer_id, self.secret]),
        )
        .await?;

        self.expiry = lock.expiry;
        Ok(lock.acquired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    #[test]
    fn secret_is_ten_lowercase_chars() {
        let secret = random_secret();
        assert_eq!(secret.len(), 10);
        assert!(secret.chars().all(|c| c.is_ascii_lowercase()));

        // Two draws almost surely differ; equal draws would mean the rng is
        // not being consulted at all.
        assert_ne!(random_secret(), random_secret());
    }

    #[tokio::test]
    async fn locked_peers_maps_fetch_locks() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/rpc/v0")
                .body_contains("NodeLocker.FetchLocks");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "result": [
                    {"PeerID": "p1", "Expiry": "2030-01-01T00:00:00Z", "Aquired": true},
                    {"PeerID": "p2", "Expiry": "2030-01-01T00:00:00Z", "Aquired": true},
                ],
                "id": 0,
            }));
        });

        let client = LockerClient::new(&server.base_url()).unwrap();
        let peers = client.locked_peers().await.unwrap();

        assert_eq!(peers, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn lock_acquired_yields_handle_with_server_expiry() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/rpc/v0")
                .body_contains("NodeLocker.Lock");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "result": {"PeerID": "p1", "Expiry": "2030-01-01T00:01:00Z", "Aquired": true},
                "id": 0,
            }));
        });

        let client = LockerClient::new(&server.base_url()).unwrap();
        let handle = client.lock("p1").await.unwrap().expect("lock acquired");

        assert_eq!(handle.peer_id(), "p1");
        assert_eq!(
            handle.expiry(),
            OffsetDateTime::parse(
                "2030-01-01T00:01:00Z",
                &time::format_description::well_known::Rfc3339
            )
            .unwrap()
        );
    }

    #[tokio::test]
    async fn lock_rejected_yields_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/rpc/v0");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "result": {"PeerID": "p1", "Expiry": "2030-01-01T00:01:00Z", "Aquired": false},
                "id": 0,
            }));
        });

        let client = LockerClient::new(&server.base_url()).unwrap();
        assert!(client.lock("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn renew_submits_peer_and_secret() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/rpc/v0")
                .body_contains("NodeLocker.Lock")
                .body_contains("\"p1\"");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "result": {"PeerID": "p1", "Expiry": "2030-01-01T00:02:00Z", "Aquired": true},
                "id": 0,
            }));
        });

        let client = LockerClient::new(&server.base_url()).unwrap();
        let mut handle = client.lock("p1").await.unwrap().unwrap();
        let first_expiry = handle.expiry();

        assert!(handle.renew().await.unwrap());
        assert_eq!(handle.expiry(), first_expiry);
        mock.assert_hits(2);
    }
}
