//! JSON-RPC client for a service's operator listener.

use anyhow::{anyhow, bail, Result};
use fca_locker::NodeLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

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

pub struct OperatorClient {
    http: reqwest::Client,
    rpc_url: Url,
}

impl OperatorClient {
    pub fn new(endpoint: &str) -> Result<Self> {
        let base = Url::parse(endpoint)
            .map_err(|e| anyhow!("invalid operator endpoint {endpoint}: {e}"))?;
        let rpc_url = base.join("rpc/v0")?;

        Ok(Self {
            http: reqwest::Client::new(),
            rpc_url,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 0,
        });

        let response: RpcResponse<serde_json::Value> = self
            .http
            .post(self.rpc_url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            bail!("{method} failed: {} (code {})", err.message, err.code);
        }

        // A null result is legal for notifications like LogSetLevel.
        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result)
            .map_err(|e| anyhow!("{method} returned an unexpected result: {e}"))
    }

    pub async fn fetch_locks(&self) -> Result<Vec<NodeLock>> {
        self.call("NodeLocker.FetchLocks", serde_json::json!([]))
            .await
    }

    pub async fn lock(&self, peer_id: &str, secret: &str) -> Result<NodeLock> {
        self.call("NodeLocker.Lock", serde_json::json!([peer_id, secret]))
            .await
    }

    pub async fn version(&self) -> Result<String> {
        self.call("Operator.Version", serde_json::json!([])).await
    }

    pub async fn log_list(&self) -> Result<Vec<String>> {
        self.call("Operator.LogList", serde_json::json!([])).await
    }

    pub async fn log_set_level(&self, subsystem: &str, level: &str) -> Result<()> {
        // The success reply carries a null result.
        let _: serde_json::Value = self
            .call("Operator.LogSetLevel", serde_json::json!([subsystem, level]))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    #[tokio::test]
    async fn version_round_trips() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/rpc/v0")
                .body_contains("Operator.Version");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "result": "0.2.0",
                "id": 0,
            }));
        });

        let client = OperatorClient::new(&server.base_url()).unwrap();
        assert_eq!(client.version().await.unwrap(), "0.2.0");
    }

    #[tokio::test]
    async fn rpc_errors_become_failures() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/rpc/v0");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "error": {"code": -32601, "message": "method not found: Nope"},
                "id": 0,
            }));
        });

        let client = OperatorClient::new(&server.base_url()).unwrap();
        let err = client.log_list().await.unwrap_err();
        assert!(err.to_string().contains("method not found"));
    }

    #[tokio::test]
    async fn fetch_locks_parses_wire_locks() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/rpc/v0")
                .body_contains("NodeLocker.FetchLocks");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "result": [
                    {"PeerID": "p1", "Expiry": "2030-01-01T00:00:00Z", "Aquired": true},
                ],
                "id": 0,
            }));
        });

        let client = OperatorClient::new(&server.base_url()).unwrap();
        let locks = client.fetch_locks().await.unwrap();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].peer_id, "p1");
    }
}
