//! The `create` command: one snapshot run end to end.
//!
//! The epoch height is calculated by computing the current expected height
//! and finding the next interval boundary after it, offset by the
//! confidence. The expected-height calculation can be bypassed with the
//! `after` flag, and an exact height can be supplied with `height`.

use anyhow::{bail, Context, Result};
use clap::Args;
use fca_chain::{ConsensusManager, HttpNodeClient, NodeClient};
use fca_core::config::read_secret_file;
use fca_core::{
    expected_height_at, latest_key, next_snapshot_height, time_at_height, ChainEpoch,
    ExportWorkerConfig, SnapshotDescriptor, SnapshotName, BLOCK_TIME,
};
use fca_export::{
    join_retrieval_url, run_export, spawn_renewal, upload_checksum, upload_latest, DiscardSink,
    PipelineConfig,
};
use fca_storage::{ObjectStore, PutOptions, S3Backend};
use figment::providers::{Format, Toml};
use figment::Figment;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

const DEFAULT_INTERVAL: ChainEpoch = 120;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Prefix added to every snapshot object name
    #[arg(long, default_value = "default/", env = "FCA_CREATE_NAME_PREFIX")]
    pub name_prefix: String,

    /// Host and port of the nodelocker api
    #[arg(
        long,
        default_value = "http://127.0.0.1:5100",
        env = "FCA_CREATE_NODELOCKER_API"
    )]
    pub nodelocker_api: String,

    /// Bucket name for the export upload
    #[arg(long, env = "FCA_CREATE_BUCKET")]
    pub bucket: Option<String>,

    /// Bucket host and port for the upload
    #[arg(long, env = "FCA_CREATE_BUCKET_ENDPOINT")]
    pub bucket_endpoint: Option<String>,

    /// Public endpoint prefix snapshots are retrieved from
    #[arg(long, env = "FCA_CREATE_RETRIEVAL_ENDPOINT_PREFIX")]
    pub retrieval_endpoint_prefix: Option<String>,

    /// Access key for the upload
    #[arg(long, env = "FCA_CREATE_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// Secret key for the upload
    #[arg(long, env = "FCA_CREATE_SECRET_KEY")]
    pub secret_key: Option<String>,

    /// Discard output, do not upload
    #[arg(long, env = "FCA_CREATE_DISCARD")]
    pub discard: bool,

    /// Path to the worker configuration file
    #[arg(long, default_value = "./config.toml", env = "FCA_CONFIG_PATH")]
    pub config_path: String,

    /// Interval used to determine the next export height
    #[arg(long, env = "FCA_CREATE_INTERVAL")]
    pub interval: Option<ChainEpoch>,

    /// Number of epochs that must exist past the export height
    #[arg(long, default_value_t = 15, env = "FCA_CREATE_CONFIDENCE")]
    pub confidence: ChainEpoch,

    /// Use the interval boundary after this height
    #[arg(long, env = "FCA_CREATE_AFTER")]
    pub after: Option<ChainEpoch>,

    /// Create a snapshot from this exact height
    #[arg(long, env = "FCA_CREATE_HEIGHT")]
    pub height: Option<ChainEpoch>,

    /// Number of state-roots to include in the snapshot
    #[arg(long, default_value_t = 2000, env = "FCA_CREATE_STATEROOT_COUNT")]
    pub stateroot_count: ChainEpoch,

    /// Seconds between progress log lines
    #[arg(long, default_value_t = 60, env = "FCA_CREATE_PROGRESS_UPDATE")]
    pub progress_update: u64,
}

pub async fn run(args: CreateArgs) -> Result<()> {
    // Fail on a malformed endpoint before any scheduling work happens.
    if let Some(endpoint) = &args.bucket_endpoint {
        url::Url::parse(endpoint)
            .with_context(|| format!("invalid bucket endpoint: {endpoint}"))?;
    }

    let config = load_worker_config(&args.config_path)?;
    let nodes = dial_nodes(&config).await?;
    let node_count = nodes.len();
    let mut cm = ConsensusManager::new(nodes);

    if !cm.check_genesis().await {
        bail!("nodes do not share the same genesis");
    }
    let genesis = cm.genesis().await?;

    let now = OffsetDateTime::now_utc();
    let expected = expected_height_at(&genesis, now, BLOCK_TIME);
    let interval = args.interval.unwrap_or(DEFAULT_INTERVAL);

    let height = match args.height {
        Some(height) => height,
        None => {
            let (after, after_hint) = match args.after {
                Some(after) => (after, true),
                None => (expected, false),
            };
            next_snapshot_height(after, interval, args.confidence, after_hint)
        }
    };

    let confidence_height = height + args.confidence;
    let run_at = time_at_height(&genesis, confidence_height, BLOCK_TIME);
    tracing::info!(
        snapshot_height = height,
        current_height = expected,
        confidence_height,
        run_at = %run_at,
        "snapshot"
    );

    sleep_until(run_at).await;

    let tipset_key = cm.tipset_at_height(height).await?;

    let locker = fca_locker::LockerClient::new(&args.nodelocker_api)?;
    let locked_peers = locker.locked_peers().await?;

    let iteration = if args.interval.is_some() {
        (height / interval) as usize % node_count
    } else {
        rand::thread_rng().gen_range(0..node_count)
    };
    tracing::info!(value = iteration, "iteration");
    cm.shift_start_node(iteration);

    let (node, peer_id) = cm.node_with_tipset(&tipset_key, &locked_peers).await?;
    tracing::info!(peer_id = %peer_id, "node");

    let Some(lease) = locker.lock(&peer_id).await? else {
        bail!("failed to acquire lock");
    };

    // Run-scoped cancellation: the renewal task must not outlive the run.
    let run_token = CancellationToken::new();
    let renewal = spawn_renewal(lease, run_token.clone());

    let pipeline_config = PipelineConfig {
        stateroot_count: args.stateroot_count,
        old_msg_skip: true,
        progress_interval: Duration::from_secs(args.progress_update.max(1)),
    };

    let result = export_and_publish(&args, &genesis, height, node, &tipset_key, &pipeline_config).await;

    run_token.cancel();
    renewal.await.ok();

    result
}

async fn export_and_publish(
    args: &CreateArgs,
    genesis: &fca_core::GenesisTipset,
    height: ChainEpoch,
    node: Arc<dyn NodeClient>,
    tipset_key: &fca_core::TipsetKey,
    pipeline_config: &PipelineConfig,
) -> Result<()> {
    if args.discard {
        tracing::info!("discarding output");
        let outcome = run_export(node, tipset_key, pipeline_config, Box::new(DiscardSink::new()))
            .await?;
        tracing::info!(
            digest = %outcome.digest.iter().map(|b| format!("{b:02x}")).collect::<String>(),
            raw_bytes = outcome.raw_bytes,
            "finished"
        );
        return Ok(());
    }

    let bucket = args.bucket.as_deref().context("bucket is required")?;
    let endpoint = args
        .bucket_endpoint
        .clone()
        .context("bucket-endpoint is required")?;
    let retrieval_prefix = args
        .retrieval_endpoint_prefix
        .as_deref()
        .context("retrieval-endpoint-prefix is required")?;

    let store = S3Backend::new(
        bucket,
        Some(endpoint),
        None,
        args.access_key.clone(),
        args.secret_key.clone(),
        true,
    )
    .await?;

    let name = SnapshotName::new(height, time_at_height(genesis, height, BLOCK_TIME));
    let filename = name.car_filename()?;
    let object_key = format!("{}{}", args.name_prefix, filename);
    tracing::info!(name = %object_key, "object");

    let sink = store
        .put_stream(&object_key, PutOptions::attachment(&filename))
        .await?;
    let outcome = run_export(node, tipset_key, pipeline_config, sink).await?;
    tracing::info!(
        bucket,
        key = %object_key,
        size = outcome.stored_bytes,
        "upload"
    );

    let retrieval_url = join_retrieval_url(retrieval_prefix, &object_key)?;
    let descriptor = SnapshotDescriptor {
        digest: outcome.digest,
        byte_size: outcome.stored_bytes,
        filename: filename.clone(),
        latest_index_key: latest_key(&args.name_prefix),
        retrieval_url: retrieval_url.clone(),
    };

    let checksum_filename = name.checksum_filename()?;
    let checksum_key = format!("{}{}", args.name_prefix, checksum_filename);
    if let Err(err) =
        upload_checksum(&store, &checksum_key, &checksum_filename, &descriptor).await
    {
        tracing::error!(object = %checksum_key, error = %err, "failed to write sha256sum");
    }

    upload_latest(&store, &descriptor.latest_index_key, &retrieval_url)
        .await
        .with_context(|| format!("failed to write latest ({})", descriptor.latest_index_key))?;

    tracing::info!(digest = %descriptor.digest_hex(), "finished");
    Ok(())
}

fn load_worker_config(path: &str) -> Result<ExportWorkerConfig> {
    if !Path::new(path).exists() {
        return Ok(ExportWorkerConfig::default());
    }

    Figment::new()
        .merge(Toml::file(path))
        .extract()
        .with_context(|| format!("failed to load configuration from {path}"))
}

async fn dial_nodes(config: &ExportWorkerConfig) -> Result<Vec<Arc<dyn NodeClient>>> {
    let mut nodes: Vec<Arc<dyn NodeClient>> = Vec::new();

    for endpoint in &config.nodes {
        let token = match &endpoint.token_path {
            Some(path) => Some(read_secret_file(path)?),
            None => None,
        };

        match HttpNodeClient::connect(&endpoint.address, token).await {
            Ok(node) => nodes.push(Arc::new(node)),
            Err(err) => {
                tracing::warn!(address = %endpoint.address, error = %err, "failed to dial node");
            }
        }
    }

    if nodes.is_empty() {
        bail!("no nodes");
    }

    Ok(nodes)
}

async fn sleep_until(at: OffsetDateTime) {
    let wait = at - OffsetDateTime::now_utc();
    if let Ok(wait) = Duration::try_from(wait) {
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [[Nodes]]
            Address = "https://node-0.example.net:1234"
            TokenPath = "/secrets/token"
            "#,
        )
        .unwrap();

        let config = load_worker_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.nodes[0].address, "https://node-0.example.net:1234");
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let config = load_worker_config("/definitely/not/here.toml").unwrap();
        assert!(config.nodes.is_empty());
    }

    #[tokio::test]
    async fn dialing_no_nodes_fails() {
        let config = ExportWorkerConfig::default();
        assert!(dial_nodes(&config).await.is_err());
    }

    #[test]
    fn explicit_interval_pins_the_start_node_rotation() {
        // iteration = (height / interval) % node_count
        let height: ChainEpoch = 1200;
        let interval: ChainEpoch = 120;
        let node_count = 3usize;

        assert_eq!((height / interval) as usize % node_count, 1);
    }
}
