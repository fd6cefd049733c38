//! The node client seam and its HTTP JSON-RPC implementation.

use crate::error::{ChainError, ChainResult};
use async_trait::async_trait;
use bytes::Bytes;
use fca_core::{ChainEpoch, GenesisTipset, Tipset, TipsetKey};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

/// A lazy, single-consumer sequence of export byte chunks. A zero-length
/// chunk is the terminator the source emits on clean completion.
pub type ExportStream = Pin<Box<dyn Stream<Item = ChainResult<Bytes>> + Send>>;

/// Capability handle over one full-chain node. Lifetime is the worker run.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// The chain's genesis tipset.
    async fn genesis(&self) -> ChainResult<GenesisTipset>;

    /// The node's view of the tipset at `height`.
    async fn tipset_at_height(&self, height: ChainEpoch) -> ChainResult<Tipset>;

    /// Fetch a tipset by key; errors when the node does not serve it.
    async fn tipset_by_key(&self, key: &TipsetKey) -> ChainResult<Tipset>;

    /// The node's peer identity.
    async fn identity(&self) -> ChainResult<String>;

    /// The node's software version.
    async fn version(&self) -> ChainResult<String>;

    /// Stream a chain export rooted at `key` with `nroots` state-roots.
    async fn chain_export(
        &self,
        nroots: ChainEpoch,
        old_msg_skip: bool,
        key: &TipsetKey,
    ) -> ChainResult<ExportStream>;
}

/// How long to wait for a node's API to answer before giving up.
const WAIT_API_TIMEOUT: Duration = Duration::from_secs(300);
const WAIT_API_STEP: Duration = Duration::from_secs(1);

/// Poll `version()` until the node answers, with a 300 second deadline.
pub async fn wait_api(node: &dyn NodeClient) -> ChainResult<()> {
    tracing::info!("waiting for node to come online");
    let deadline = tokio::time::Instant::now() + WAIT_API_TIMEOUT;
    loop {
        match node.version().await {
            Ok(_) => return Ok(()),
            Err(err) => {
                tracing::debug!(error = %err, "not online yet");
            }
        }

        if tokio::time::Instant::now() + WAIT_API_STEP > deadline {
            return Err(ChainError::NodeOffline);
        }
        tokio::time::sleep(WAIT_API_STEP).await;
    }
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

#[derive(Deserialize)]
struct TipsetJson {
    #[serde(rename = "Cids")]
    cids: serde_json::Value,
    #[serde(rename = "Blocks")]
    blocks: Vec<BlockJson>,
    #[serde(rename = "Height")]
    height: ChainEpoch,
}

#[derive(Deserialize)]
struct BlockJson {
    #[serde(rename = "Timestamp")]
    timestamp: u64,
}

#[derive(Deserialize)]
struct VersionJson {
    #[serde(rename = "Version")]
    version: String,
}

impl TipsetJson {
    /// Tipset keys travel as the canonical JSON of the CID array, keeping the
    /// key opaque to everything above this client.
    fn key(&self) -> ChainResult<TipsetKey> {
        let raw = serde_json::to_string(&self.cids).map_err(|e| ChainError::InvalidResponse {
            method: "tipset".to_string(),
            reason: e.to_string(),
        })?;
        Ok(TipsetKey::new(raw))
    }

    fn min_timestamp(&self) -> u64 {
        self.blocks
            .iter()
            .map(|b| b.timestamp)
            .min()
            .unwrap_or_default()
    }
}

/// JSON-RPC client for a full-chain node.
pub struct HttpNodeClient {
    http: reqwest::Client,
    rpc_url: Url,
    export_url: Url,
    token: Option<String>,
    next_id: AtomicU64,
}

impl HttpNodeClient {
    /// Create a client for `address` and verify the node answers. Dial
    /// failures surface here so callers can skip dead nodes.
    pub async fn connect(address: &str, token: Option<String>) -> ChainResult<Self> {
        let client = Self::new(address, token)?;
        client.version().await?;
        Ok(client)
    }

    /// Create a client without probing the node.
    pub fn new(address: &str, token: Option<String>) -> ChainResult<Self> {
        let base =
            Url::parse(address).map_err(|e| ChainError::InvalidAddress(format!("{address}: {e}")))?;
        let rpc_url = base
            .join("rpc/v1")
            .map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
        let export_url = base
            .join("rest/v0/chain/export")
            .map_err(|e| ChainError::InvalidAddress(e.to_string()))?;

        Ok(Self {
            http: reqwest::Client::new(),
            rpc_url,
            export_url,
            token,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> ChainResult<T> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let mut request = self.http.post(self.rpc_url.clone()).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response: RpcResponse<T> = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(ChainError::Rpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            });
        }

        response.result.ok_or_else(|| ChainError::InvalidResponse {
            method: method.to_string(),
            reason: "missing result".to_string(),
        })
    }

    fn key_params(key: &TipsetKey) -> ChainResult<serde_json::Value> {
        serde_json::from_str(key.as_str()).map_err(|e| ChainError::InvalidResponse {
            method: "tipset key".to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn genesis(&self) -> ChainResult<GenesisTipset> {
        let ts: TipsetJson = self
            .call("Filecoin.ChainGetGenesis", serde_json::json!([]))
            .await?;
        Ok(GenesisTipset {
            key: ts.key()?,
            min_timestamp: ts.min_timestamp(),
        })
    }

    async fn tipset_at_height(&self, height: ChainEpoch) -> ChainResult<Tipset> {
        let ts: TipsetJson = self
            .call(
                "Filecoin.ChainGetTipSetByHeight",
                serde_json::json!([height, []]),
            )
            .await?;
        Ok(Tipset {
            key: ts.key()?,
            height: ts.height,
        })
    }

    async fn tipset_by_key(&self, key: &TipsetKey) -> ChainResult<Tipset> {
        let params = serde_json::json!([Self::key_params(key)?]);
        let ts: TipsetJson = self.call("Filecoin.ChainGetTipSet", params).await?;
        Ok(Tipset {
            key: ts.key()?,
            height: ts.height,
        })
    }

    async fn identity(&self) -> ChainResult<String> {
        self.call("Filecoin.ID", serde_json::json!([])).await
    }

    async fn version(&self) -> ChainResult<String> {
        let v: VersionJson = self.call("Filecoin.Version", serde_json::json!([])).await?;
        Ok(v.version)
    }

    async fn chain_export(
        &self,
        nroots: ChainEpoch,
        old_msg_skip: bool,
        key: &TipsetKey,
    ) -> ChainResult<ExportStream> {
        let mut request = self.http.get(self.export_url.clone()).query(&[
            ("nroots", nroots.to_string()),
            ("oldmsgskip", old_msg_skip.to_string()),
            ("tsk", key.as_str().to_string()),
        ]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        let mut body = response.bytes_stream();

        // Re-emit the body with the zero-length terminator appended on clean
        // completion. A connection lost mid-stream ends the stream on the
        // error without the terminator, which downstream treats as an
        // incomplete export.
        let stream = async_stream::try_stream! {
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(ChainError::Transport)?;
                yield chunk;
            }
            yield Bytes::new();
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    fn tipset_body(cid: &str, height: i64, timestamps: &[u64]) -> serde_json::Value {
        serde_json::json!({
            "jsonrpc": "2.0",
            "result": {
                "Cids": [{"/": cid}],
                "Blocks": timestamps
                    .iter()
                    .map(|t| serde_json::json!({"Timestamp": t}))
                    .collect::<Vec<_>>(),
                "Height": height,
            },
            "id": 1,
        })
    }

    #[tokio::test]
    async fn genesis_uses_minimum_block_timestamp() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/rpc/v1")
                .body_contains("Filecoin.ChainGetGenesis");
            then.status(200)
                .json_body(tipset_body("bafy-genesis", 0, &[1_600_000_100, 1_600_000_000]));
        });

        let client = HttpNodeClient::new(&server.base_url(), None).unwrap();
        let genesis = client.genesis().await.unwrap();

        assert_eq!(genesis.min_timestamp, 1_600_000_000);
        assert!(genesis.key.as_str().contains("bafy-genesis"));
    }

    #[tokio::test]
    async fn rpc_error_is_surfaced() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/rpc/v1");
            then.status(200).json_body(serde_json::json!({
                "jsonrpc": "2.0",
                "error": {"code": 1, "message": "bad height"},
                "id": 1,
            }));
        });

        let client = HttpNodeClient::new(&server.base_url(), None).unwrap();
        match client.tipset_at_height(10).await {
            Err(ChainError::Rpc { code, message, .. }) => {
                assert_eq!(code, 1);
                assert_eq!(message, "bad height");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tipset_key_round_trips_through_requests() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/rpc/v1")
                .body_contains("Filecoin.ChainGetTipSetByHeight");
            then.status(200).json_body(tipset_body("bafy-100", 100, &[1]));
        });
        let by_key = server.mock(|when, then| {
            when.method(POST)
                .path("/rpc/v1")
                .body_contains("Filecoin.ChainGetTipSet\"")
                .body_contains("bafy-100");
            then.status(200).json_body(tipset_body("bafy-100", 100, &[1]));
        });

        let client = HttpNodeClient::new(&server.base_url(), None).unwrap();
        let tipset = client.tipset_at_height(100).await.unwrap();
        let fetched = client.tipset_by_key(&tipset.key).await.unwrap();

        by_key.assert();
        assert_eq!(fetched.key, tipset.key);
        assert_eq!(fetched.height, 100);
    }
}
