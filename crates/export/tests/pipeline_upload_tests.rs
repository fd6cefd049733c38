//! End-to-end pipeline scenario: a synthetic chain export streamed through
//! compression and digesting into a real (filesystem) object store, followed
//! by checksum and latest-pointer publication.

use async_compression::tokio::write::ZstdEncoder;
use async_trait::async_trait;
use bytes::Bytes;
use fca_chain::{ChainError, ChainResult, ExportStream, NodeClient};
use fca_core::{latest_key, ChainEpoch, GenesisTipset, SnapshotDescriptor, SnapshotName, Tipset, TipsetKey};
use fca_export::{
    checksum_body, join_retrieval_url, run_export, upload_checksum, upload_latest, PipelineConfig,
};
use fca_storage::{FilesystemBackend, ObjectStore, PutOptions};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;

struct SyntheticNode {
    chunks: Vec<Bytes>,
    /// When false the stream ends without the zero-length terminator,
    /// simulating a lost node connection mid-export.
    terminated: bool,
}

#[async_trait]
impl NodeClient for SyntheticNode {
    async fn genesis(&self) -> ChainResult<GenesisTipset> {
        Err(ChainError::NodeOffline)
    }

    async fn tipset_at_height(&self, _height: ChainEpoch) -> ChainResult<Tipset> {
        Err(ChainError::NodeOffline)
    }

    async fn tipset_by_key(&self, key: &TipsetKey) -> ChainResult<Tipset> {
        Ok(Tipset {
            key: key.clone(),
            height: 0,
        })
    }

    async fn identity(&self) -> ChainResult<String> {
        Ok("synthetic".to_string())
    }

    async fn version(&self) -> ChainResult<String> {
        Ok("synthetic".to_string())
    }

    async fn chain_export(
        &self,
        _nroots: ChainEpoch,
        _old_msg_skip: bool,
        _key: &TipsetKey,
    ) -> ChainResult<ExportStream> {
        let mut items: Vec<ChainResult<Bytes>> = self.chunks.iter().cloned().map(Ok).collect();
        if self.terminated {
            items.push(Ok(Bytes::new()));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

fn payload(len: usize) -> Vec<u8> {
    const PATTERN: &[u8] = b"block-header-parent-state-root-messages-";
    (0..len)
        .map(|i| PATTERN[i % PATTERN.len()] ^ ((i / 4096) as u8))
        .collect()
}

async fn zstd_reference(input: &[u8]) -> Vec<u8> {
    let mut encoder = ZstdEncoder::new(Vec::new());
    encoder.write_all(input).await.unwrap();
    encoder.shutdown().await.unwrap();
    encoder.into_inner()
}

#[tokio::test]
async fn one_mebibyte_export_round_trips_through_the_store() {
    let temp = tempdir().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(FilesystemBackend::new(temp.path()).await.unwrap());

    let input = payload(1024 * 1024);
    let node = Arc::new(SyntheticNode {
        chunks: input.chunks(32 * 1024).map(Bytes::copy_from_slice).collect(),
        terminated: true,
    });

    let name = SnapshotName::new(
        1_234_560,
        OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(1_709_543_106),
    );
    let filename = name.car_filename().unwrap();
    let object_key = format!("default/{filename}");

    let config = PipelineConfig {
        stateroot_count: 2000,
        old_msg_skip: true,
        progress_interval: Duration::from_secs(60),
    };

    let sink = store
        .put_stream(&object_key, PutOptions::attachment(&filename))
        .await
        .unwrap();
    let outcome = run_export(node, &TipsetKey::new("tsk"), &config, sink)
        .await
        .unwrap();

    // The stored object is exactly the zstd encoding of the input.
    let stored = store.get(&object_key).await.unwrap();
    let reference = zstd_reference(&input).await;
    assert_eq!(&stored[..], &reference[..]);
    assert_eq!(outcome.raw_bytes, input.len() as u64);
    assert_eq!(outcome.stored_bytes, reference.len() as u64);

    // The digest covers the stored bytes.
    let expected: [u8; 32] = Sha256::digest(&stored).into();
    assert_eq!(outcome.digest, expected);

    // Checksum manifest and latest pointer.
    let retrieval_url =
        join_retrieval_url("https://snapshots.example.net", &object_key).unwrap();
    let descriptor = SnapshotDescriptor {
        digest: outcome.digest,
        byte_size: outcome.stored_bytes,
        filename: filename.clone(),
        latest_index_key: latest_key("default/"),
        retrieval_url: retrieval_url.clone(),
    };

    let checksum_key = format!("default/{}", name.checksum_filename().unwrap());
    upload_checksum(
        store.as_ref(),
        &checksum_key,
        &name.checksum_filename().unwrap(),
        &descriptor,
    )
    .await
    .unwrap();

    let manifest = store.get(&checksum_key).await.unwrap();
    let expected_line = format!("{} *{}\n", descriptor.digest_hex(), filename);
    assert_eq!(std::str::from_utf8(&manifest).unwrap(), expected_line);
    assert_eq!(checksum_body(&descriptor), expected_line);

    upload_latest(store.as_ref(), &descriptor.latest_index_key, &retrieval_url)
        .await
        .unwrap();
    let pointer = store.get("default/latest").await.unwrap();
    assert_eq!(
        std::str::from_utf8(&pointer).unwrap(),
        format!("https://snapshots.example.net/{object_key}")
    );
}

#[tokio::test]
async fn incomplete_export_leaves_no_object_in_the_store() {
    let temp = tempdir().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(FilesystemBackend::new(temp.path()).await.unwrap());

    let input = payload(128 * 1024);
    let node = Arc::new(SyntheticNode {
        chunks: input.chunks(32 * 1024).map(Bytes::copy_from_slice).collect(),
        terminated: false,
    });

    let object_key = "default/100_2024_01_01T00_00_00Z.car.zst";
    let config = PipelineConfig {
        stateroot_count: 2000,
        old_msg_skip: true,
        progress_interval: Duration::from_secs(60),
    };

    let sink = store
        .put_stream(object_key, PutOptions::attachment("100_2024_01_01T00_00_00Z.car.zst"))
        .await
        .unwrap();
    let result = run_export(node, &TipsetKey::new("tsk"), &config, sink).await;

    assert!(result.is_err());
    assert!(store.get(object_key).await.is_err());
}
