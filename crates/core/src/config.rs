//! Configuration types shared across crates.
//!
//! Field names mirror the TOML files operators already carry:
//!
//! ```toml
//! [[Nodes]]
//! Address = "https://node-0.example.net:1234"
//! TokenPath = "/secrets/node-0.token"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the snapshot worker.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExportWorkerConfig {
    /// Full-chain nodes eligible to serve exports.
    #[serde(rename = "Nodes", default)]
    pub nodes: Vec<NodeEndpoint>,
}

/// A single chain node endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeEndpoint {
    /// Base URL of the node's RPC listener.
    #[serde(rename = "Address")]
    pub address: String,
    /// Path to a file holding the node's API token. Optional; the token is
    /// attached as a bearer credential when present.
    #[serde(rename = "TokenPath", default)]
    pub token_path: Option<String>,
}

/// Configuration for the index resolver service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndexServiceConfig {
    #[serde(rename = "S3Resolver", default)]
    pub s3_resolver: S3ResolverConfig,
}

/// Object-store coordinates the resolver reads pointers from.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct S3ResolverConfig {
    #[serde(rename = "Endpoint")]
    pub endpoint: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "AccessKeyPath")]
    pub access_key_path: String,
    #[serde(rename = "SecretKeyPath")]
    pub secret_key_path: String,
}

/// Read a token or key file, stripping the trailing newline editors and
/// secret managers tend to append.
pub fn read_secret_file(path: impl AsRef<Path>) -> crate::Result<String> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| crate::Error::SecretFile {
        path: path.display().to_string(),
        source,
    })?;
    let trimmed = raw.strip_suffix('\n').unwrap_or(&raw);
    Ok(trimmed.to_string())
}
