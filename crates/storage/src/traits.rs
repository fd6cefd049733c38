//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Request metadata attached to a stored object.
#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    /// MIME type served back to consumers.
    pub content_type: Option<String>,
    /// Content-Disposition header stored with the object.
    pub content_disposition: Option<String>,
    /// Website redirect target stored as object metadata
    /// (`x-amz-website-redirect-location`).
    pub website_redirect: Option<String>,
}

impl PutOptions {
    /// Options for an octet-stream download with an attachment filename.
    pub fn attachment(filename: &str) -> Self {
        Self {
            content_type: Some("application/octet-stream".to_string()),
            content_disposition: Some(format!("attachment; filename=\"{filename}\"")),
            website_redirect: None,
        }
    }

    /// Options for a small plain-text object.
    pub fn text_plain() -> Self {
        Self {
            content_type: Some("text/plain".to_string()),
            content_disposition: None,
            website_redirect: None,
        }
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
    /// Website redirect target (if set at upload time).
    pub website_redirect: Option<String>,
}

/// Object store abstraction.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Get an object's metadata without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put a small object atomically.
    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> StorageResult<()>;

    /// Start a streaming upload with unknown final length.
    async fn put_stream(
        &self,
        key: &str,
        opts: PutOptions,
    ) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Static identifier for the backend type, used for metrics and logging.
    fn backend_name(&self) -> &'static str;
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
