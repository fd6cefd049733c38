//! The export → compress → digest → upload pipeline.

use crate::error::{ExportError, ExportResult};
use crate::progress::Progress;
use async_compression::tokio::write::ZstdEncoder;
use async_trait::async_trait;
use bytes::Bytes;
use fca_chain::{wait_api, ExportStream, NodeClient};
use fca_core::{ChainEpoch, TipsetKey};
use fca_storage::{StorageResult, StreamingUpload};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

/// Buffer between the compressor and the uploader. Full buffers apply
/// back-pressure to the export driver.
const PIPE_BUFFER: usize = 256 * 1024;

/// Pipeline tuning for one snapshot run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Number of historical state-roots included in the export.
    pub stateroot_count: ChainEpoch,
    /// Skip messages older than the state-root window.
    pub old_msg_skip: bool,
    /// How often the progress task reports.
    pub progress_interval: Duration,
}

/// What the pipeline produced.
#[derive(Clone, Debug)]
pub struct ExportOutcome {
    /// SHA-256 of the bytes handed to the sink.
    pub digest: [u8; 32],
    /// Bytes handed to the sink (compressed).
    pub stored_bytes: u64,
    /// Bytes produced by the node (uncompressed).
    pub raw_bytes: u64,
}

/// Run one export through the pipeline into `sink`.
///
/// The caller owns node selection and lease acquisition; the pipeline owns
/// the export driver and progress tasks. The upload drains first at
/// end-of-stream, then the driver's error is collected; the sink is only
/// committed once the driver reports a complete export, and is aborted on
/// any failure so no truncated object is left behind.
pub async fn run_export(
    node: Arc<dyn NodeClient>,
    key: &TipsetKey,
    config: &PipelineConfig,
    mut sink: Box<dyn StreamingUpload>,
) -> ExportResult<ExportOutcome> {
    wait_api(node.as_ref()).await?;

    tracing::info!("starting export");
    let stream = node
        .chain_export(config.stateroot_count, config.old_msg_skip, key)
        .await?;

    let progress = Arc::new(Progress::new());
    let done = CancellationToken::new();

    let progress_task = tokio::spawn(progress_loop(
        Arc::clone(&progress),
        config.progress_interval,
        done.clone(),
    ));

    let (writer, reader) = tokio::io::duplex(PIPE_BUFFER);
    let driver = tokio::spawn(drive_export(stream, writer, Arc::clone(&progress)));

    let mut hasher = Sha256::new();
    let mut stored_bytes: u64 = 0;
    let mut compressed = ReaderStream::with_capacity(reader, PIPE_BUFFER);

    let upload_result: ExportResult<()> = async {
        while let Some(chunk) = compressed.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            stored_bytes += chunk.len() as u64;
            sink.write(chunk).await?;
        }
        Ok(())
    }
    .await;

    // Dropping the reader unblocks a driver still writing after an upload
    // failure; its writes fail with a broken pipe instead of backing up.
    drop(compressed);
    let driver_result: ExportResult<u64> = match driver.await {
        Ok(result) => result,
        Err(e) => Err(ExportError::TaskFailed(e.to_string())),
    };
    done.cancel();
    progress_task.await.ok();

    // Commit only a complete export. A drained stream with a driver error
    // means the bytes uploaded so far are a truncated export.
    match (upload_result, driver_result) {
        (Ok(()), Ok(raw_bytes)) => {
            sink.finish().await?;
            Ok(ExportOutcome {
                digest: hasher.finalize().into(),
                stored_bytes,
                raw_bytes,
            })
        }
        (Err(err), _) => {
            abort_sink(sink).await;
            Err(err)
        }
        (Ok(()), Err(err)) => {
            abort_sink(sink).await;
            Err(err)
        }
    }
}

/// Best-effort abort; the run already failed, so an abort failure only
/// means an orphaned partial upload for out-of-band cleanup.
async fn abort_sink(sink: Box<dyn StreamingUpload>) {
    if let Err(err) = sink.abort().await {
        tracing::warn!(error = %err, "failed to abort upload");
    }
}

/// Drives the source into the compressor. Returns the raw byte count.
async fn drive_export(
    mut stream: ExportStream,
    writer: DuplexStream,
    progress: Arc<Progress>,
) -> ExportResult<u64> {
    let mut encoder = ZstdEncoder::new(writer);
    let mut last = false;
    let mut raw_bytes: u64 = 0;

    let result = async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            last = chunk.is_empty();
            progress.add(chunk.len() as u64);
            raw_bytes += chunk.len() as u64;

            if !chunk.is_empty() {
                encoder
                    .write_all(&chunk)
                    .await
                    .map_err(ExportError::Compressor)?;
            }
        }

        if !last {
            return Err(ExportError::IncompleteExport);
        }

        // Flush failure is fatal to the run.
        encoder.shutdown().await.map_err(ExportError::Compressor)?;
        Ok(raw_bytes)
    }
    .await;

    progress.finish();
    result
}

async fn progress_loop(progress: Arc<Progress>, interval: Duration, done: CancellationToken) {
    let mut last_size: u64 = 0;
    loop {
        tokio::select! {
            _ = done.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let (size, finished) = progress.progress();
        if size == 0 {
            continue;
        }
        if finished {
            return;
        }

        let speed = (size - last_size) / interval.as_secs().max(1);
        tracing::info!(total = size, bytes_per_sec = speed, "update");
        last_size = size;
    }
}

/// Byte-counting drain used in discard mode. The rest of the pipeline is
/// unchanged.
#[derive(Default)]
pub struct DiscardSink {
    bytes: u64,
}

impl DiscardSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamingUpload for DiscardSink {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.bytes += data.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        Ok(self.bytes)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fca_chain::{ChainError, ChainResult};
    use fca_core::{GenesisTipset, Tipset};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Sink recording whether it was committed or aborted.
    struct TrackingSink {
        finished: Arc<AtomicBool>,
        aborted: Arc<AtomicBool>,
    }

    impl TrackingSink {
        fn new() -> (Box<Self>, Arc<AtomicBool>, Arc<AtomicBool>) {
            let finished = Arc::new(AtomicBool::new(false));
            let aborted = Arc::new(AtomicBool::new(false));
            let sink = Box::new(Self {
                finished: Arc::clone(&finished),
                aborted: Arc::clone(&aborted),
            });
            (sink, finished, aborted)
        }
    }

    #[async_trait]
    impl StreamingUpload for TrackingSink {
        async fn write(&mut self, _data: Bytes) -> StorageResult<()> {
            Ok(())
        }

        async fn finish(self: Box<Self>) -> StorageResult<u64> {
            self.finished.store(true, Ordering::SeqCst);
            Ok(0)
        }

        async fn abort(self: Box<Self>) -> StorageResult<()> {
            self.aborted.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) struct StreamingNode {
        chunks: Vec<Bytes>,
        terminated: bool,
    }

    impl StreamingNode {
        pub(crate) fn new(chunks: Vec<Bytes>, terminated: bool) -> Self {
            Self { chunks, terminated }
        }
    }

    #[async_trait]
    impl NodeClient for StreamingNode {
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
            Ok("stream-node".to_string())
        }

        async fn version(&self) -> ChainResult<String> {
            Ok("stub".to_string())
        }

        async fn chain_export(
            &self,
            _nroots: ChainEpoch,
            _old_msg_skip: bool,
            _key: &TipsetKey,
        ) -> ChainResult<ExportStream> {
            let mut items: Vec<ChainResult<Bytes>> =
                self.chunks.iter().cloned().map(Ok).collect();
            if self.terminated {
                items.push(Ok(Bytes::new()));
            }
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    pub(crate) fn test_config() -> PipelineConfig {
        PipelineConfig {
            stateroot_count: 2000,
            old_msg_skip: true,
            progress_interval: Duration::from_secs(60),
        }
    }

    /// Deterministic, compressible payload standing in for CAR bytes.
    pub(crate) fn synthetic_payload(len: usize) -> Vec<u8> {
        const PATTERN: &[u8] = b"tipset-block-header-and-state-root-payload-";
        (0..len)
            .map(|i| PATTERN[i % PATTERN.len()] ^ ((i / 8192) as u8))
            .collect()
    }

    pub(crate) async fn zstd_reference(input: &[u8]) -> Vec<u8> {
        let mut encoder = ZstdEncoder::new(Vec::new());
        encoder.write_all(input).await.unwrap();
        encoder.shutdown().await.unwrap();
        encoder.into_inner()
    }

    #[tokio::test]
    async fn discard_run_counts_raw_bytes() {
        let payload = synthetic_payload(64 * 1024);
        let chunks: Vec<Bytes> = payload
            .chunks(7_000)
            .map(|c| Bytes::copy_from_slice(c))
            .collect();
        let node = Arc::new(StreamingNode::new(chunks, true));

        let outcome = run_export(
            node,
            &TipsetKey::new("tsk"),
            &test_config(),
            Box::new(DiscardSink::new()),
        )
        .await
        .unwrap();

        assert_eq!(outcome.raw_bytes, payload.len() as u64);
        assert!(outcome.stored_bytes > 0);
        assert!(outcome.stored_bytes < outcome.raw_bytes);
    }

    #[tokio::test]
    async fn digest_matches_compressed_output() {
        let payload = synthetic_payload(256 * 1024);
        let chunks: Vec<Bytes> = payload
            .chunks(16 * 1024)
            .map(Bytes::copy_from_slice)
            .collect();
        let node = Arc::new(StreamingNode::new(chunks, true));

        let outcome = run_export(
            node,
            &TipsetKey::new("tsk"),
            &test_config(),
            Box::new(DiscardSink::new()),
        )
        .await
        .unwrap();

        let reference = zstd_reference(&payload).await;
        let expected: [u8; 32] = Sha256::digest(&reference).into();

        assert_eq!(outcome.digest, expected);
        assert_eq!(outcome.stored_bytes, reference.len() as u64);
    }

    #[tokio::test]
    async fn missing_terminator_is_incomplete_export() {
        let chunks = vec![Bytes::from_static(b"some bytes")];
        let node = Arc::new(StreamingNode::new(chunks, false));

        let result = run_export(
            node,
            &TipsetKey::new("tsk"),
            &test_config(),
            Box::new(DiscardSink::new()),
        )
        .await;

        assert!(matches!(result, Err(ExportError::IncompleteExport)));
    }

    #[tokio::test]
    async fn complete_export_commits_the_sink() {
        let chunks = vec![Bytes::from_static(b"some bytes")];
        let node = Arc::new(StreamingNode::new(chunks, true));
        let (sink, finished, aborted) = TrackingSink::new();

        run_export(node, &TipsetKey::new("tsk"), &test_config(), sink)
            .await
            .unwrap();

        assert!(finished.load(Ordering::SeqCst));
        assert!(!aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn incomplete_export_aborts_the_sink() {
        let chunks = vec![Bytes::from_static(b"some bytes")];
        let node = Arc::new(StreamingNode::new(chunks, false));
        let (sink, finished, aborted) = TrackingSink::new();

        let result = run_export(node, &TipsetKey::new("tsk"), &test_config(), sink).await;

        assert!(matches!(result, Err(ExportError::IncompleteExport)));
        assert!(aborted.load(Ordering::SeqCst));
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn source_error_fails_the_run() {
        struct ErroringNode;

        #[async_trait]
        impl NodeClient for ErroringNode {
            async fn genesis(&self) -> ChainResult<GenesisTipset> {
                Err(ChainError::NodeOffline)
            }
            async fn tipset_at_height(&self, _h: ChainEpoch) -> ChainResult<Tipset> {
                Err(ChainError::NodeOffline)
            }
            async fn tipset_by_key(&self, _k: &TipsetKey) -> ChainResult<Tipset> {
                Err(ChainError::NodeOffline)
            }
            async fn identity(&self) -> ChainResult<String> {
                Ok("err-node".to_string())
            }
            async fn version(&self) -> ChainResult<String> {
                Ok("stub".to_string())
            }
            async fn chain_export(
                &self,
                _nroots: ChainEpoch,
                _old_msg_skip: bool,
                _key: &TipsetKey,
            ) -> ChainResult<ExportStream> {
                let items: Vec<ChainResult<Bytes>> = vec![
                    Ok(Bytes::from_static(b"partial")),
                    Err(ChainError::NodeOffline),
                ];
                Ok(Box::pin(futures::stream::iter(items)))
            }
        }

        let (sink, finished, aborted) = TrackingSink::new();
        let result = run_export(
            Arc::new(ErroringNode),
            &TipsetKey::new("tsk"),
            &test_config(),
            sink,
        )
        .await;

        assert!(matches!(result, Err(ExportError::Chain(_))));
        assert!(aborted.load(Ordering::SeqCst));
        assert!(!finished.load(Ordering::SeqCst));
    }
}
