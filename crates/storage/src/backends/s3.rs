//! S3-compatible storage backend using the AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectMeta, ObjectStore, PutOptions, StreamingUpload};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::instrument;

/// Minimum part size for S3 multipart uploads (5 MiB).
/// S3 requires all parts except the last to be at least 5 MB.
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

fn map_s3_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

/// S3-compatible object store.
pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// # Arguments
    /// * `force_path_style` - Use path-style URLs (`endpoint/bucket/key`)
    ///   instead of virtual-hosted style. Required for MinIO and most
    ///   S3-compatible stores behind an explicit endpoint.
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        if access_key_id.is_some() ^ secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region.clone()));

        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials =
                aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "fca-config");
            builder = builder.credentials_provider(credentials);
        } else {
            // Fall back to the ambient AWS credentials chain.
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(aws_config::Region::new(resolved_region.clone()))
                .load()
                .await;
            if let Some(provider) = shared.credentials_provider() {
                builder = builder.credentials_provider(provider);
            }
        }

        if let Some(endpoint_url) = endpoint {
            // Handle bare host:port endpoints (e.g. "minio:9000").
            let endpoint_lower = endpoint_url.to_lowercase();
            let normalized = if endpoint_lower.starts_with("http://")
                || endpoint_lower.starts_with("https://")
            {
                endpoint_url
            } else {
                format!("http://{endpoint_url}")
            };
            builder = builder.endpoint_url(normalized);
        }

        if force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
        })
    }

    fn map_sdk_error<E>(err: aws_sdk_s3::error::SdkError<E>, key: &str) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err {
            if service_err.raw().status().as_u16() == 404 {
                return StorageError::NotFound(key.to_string());
            }
        }
        map_s3_error(err)
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let last_modified = output
            .last_modified()
            .and_then(|dt| time::OffsetDateTime::from_unix_timestamp(dt.secs()).ok());

        Ok(ObjectMeta {
            size: output.content_length().unwrap_or(0) as u64,
            last_modified,
            content_type: output.content_type().map(|s| s.to_string()),
            website_redirect: output.website_redirect_location().map(|s| s.to_string()),
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?
            .into_bytes();

        Ok(bytes)
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> StorageResult<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(data.into());

        if let Some(content_type) = &opts.content_type {
            request = request.content_type(content_type);
        }
        if let Some(disposition) = &opts.content_disposition {
            request = request.content_disposition(disposition);
        }
        if let Some(redirect) = &opts.website_redirect {
            request = request.website_redirect_location(redirect);
        }

        request.send().await.map_err(map_s3_error)?;
        Ok(())
    }

    #[instrument(skip(self, opts), fields(backend = "s3"))]
    async fn put_stream(
        &self,
        key: &str,
        opts: PutOptions,
    ) -> StorageResult<Box<dyn StreamingUpload>> {
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key);

        if let Some(content_type) = &opts.content_type {
            request = request.content_type(content_type);
        }
        if let Some(disposition) = &opts.content_disposition {
            request = request.content_disposition(disposition);
        }
        if let Some(redirect) = &opts.website_redirect {
            request = request.website_redirect_location(redirect);
        }

        let create_output = request.send().await.map_err(map_s3_error)?;

        let upload_id = create_output
            .upload_id()
            .ok_or_else(|| StorageError::Config("S3 did not return upload_id".to_string()))?
            .to_string();

        Ok(Box::new(S3Upload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            opts,
            upload_id,
            parts: Vec::new(),
            part_number: 1,
            bytes_written: 0,
            buffer: Vec::with_capacity(MIN_PART_SIZE),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

/// An in-flight S3 multipart upload. Chunks accumulate in memory until a full
/// part is available; memory use is bounded by the part size plus the largest
/// incoming chunk.
struct S3Upload {
    client: Client,
    bucket: String,
    key: String,
    opts: PutOptions,
    upload_id: String,
    parts: Vec<aws_sdk_s3::types::CompletedPart>,
    part_number: i32,
    bytes_written: u64,
    buffer: Vec<u8>,
}

impl S3Upload {
    async fn upload_part(&mut self, data: Bytes) -> StorageResult<()> {
        let upload_output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(self.part_number)
            .body(data.into())
            .send()
            .await
            .map_err(map_s3_error)?;

        let completed_part = aws_sdk_s3::types::CompletedPart::builder()
            .e_tag(upload_output.e_tag().unwrap_or_default())
            .part_number(self.part_number)
            .build();

        self.parts.push(completed_part);
        self.part_number += 1;

        Ok(())
    }

    async fn abort_upload(&self) {
        // Best-effort cleanup of orphaned parts.
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
        {
            tracing::warn!(
                key = %self.key,
                upload_id = %self.upload_id,
                error = %e,
                "failed to abort multipart upload, orphaned parts may remain"
            );
        }
    }
}

#[async_trait]
impl StreamingUpload for S3Upload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.bytes_written += data.len() as u64;
        self.buffer.extend_from_slice(&data);

        while self.buffer.len() >= MIN_PART_SIZE {
            let part_data: Vec<u8> = self.buffer.drain(..MIN_PART_SIZE).collect();
            self.upload_part(Bytes::from(part_data)).await?;
        }

        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        // The last part may be any size, including empty-buffer skip.
        if !self.buffer.is_empty() {
            let part_data = Bytes::from(std::mem::take(&mut self.buffer));
            self.upload_part(part_data).await?;
        }

        // S3 multipart requires at least one part; fall back to a plain PUT
        // for zero-byte objects.
        if self.parts.is_empty() {
            self.abort_upload().await;

            let mut request = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .body(Bytes::new().into());
            if let Some(content_type) = &self.opts.content_type {
                request = request.content_type(content_type);
            }
            if let Some(disposition) = &self.opts.content_disposition {
                request = request.content_disposition(disposition);
            }
            request.send().await.map_err(map_s3_error)?;
            return Ok(0);
        }

        let completed = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(self.parts.clone()))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(map_s3_error)?;

        Ok(self.bytes_written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.abort_upload().await;
        Ok(())
    }
}
