//! Local filesystem storage backend.
//!
//! Used for development and tests. Writes are atomic (temp file + rename).
//! Object metadata (content type, redirect location) is accepted but not
//! persisted; `head` reports size and modification time only.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectMeta, ObjectStore, PutOptions, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Filesystem-backed object store rooted at a directory.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a backend rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|c| c == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.object_path(key)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| map_not_found(e, key))?;

        let last_modified = meta
            .modified()
            .ok()
            .map(time::OffsetDateTime::from);

        Ok(ObjectMeta {
            size: meta.len(),
            last_modified,
            content_type: None,
            website_redirect: None,
        })
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.object_path(key)?;
        let data = fs::read(&path).await.map_err(|e| map_not_found(e, key))?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, key: &str, data: Bytes, _opts: PutOptions) -> StorageResult<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("partial");
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn put_stream(
        &self,
        key: &str,
        _opts: PutOptions,
    ) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("partial");
        let file = fs::File::create(&tmp).await?;

        Ok(Box::new(FilesystemUpload {
            file,
            tmp,
            path,
            bytes_written: 0,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

fn map_not_found(err: std::io::Error, key: &str) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

struct FilesystemUpload {
    file: fs::File,
    tmp: PathBuf,
    path: PathBuf,
    bytes_written: u64,
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);
        fs::rename(&self.tmp, &self.path).await?;
        Ok(self.bytes_written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        fs::remove_file(&self.tmp).await.ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_get_head_round_trip() {
        let temp = tempdir().unwrap();
        let store = FilesystemBackend::new(temp.path()).await.unwrap();

        store
            .put(
                "minimal/latest",
                Bytes::from_static(b"https://example.net/snap.car.zst"),
                PutOptions::text_plain(),
            )
            .await
            .unwrap();

        let body = store.get("minimal/latest").await.unwrap();
        assert_eq!(&body[..], b"https://example.net/snap.car.zst");

        let meta = store.head("minimal/latest").await.unwrap();
        assert_eq!(meta.size, body.len() as u64);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let temp = tempdir().unwrap();
        let store = FilesystemBackend::new(temp.path()).await.unwrap();

        match store.get("nope").await {
            Err(StorageError::NotFound(key)) => assert_eq!(key, "nope"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn streaming_upload_writes_all_chunks() {
        let temp = tempdir().unwrap();
        let store = FilesystemBackend::new(temp.path()).await.unwrap();

        let mut upload = store
            .put_stream("exports/1.car.zst", PutOptions::attachment("1.car.zst"))
            .await
            .unwrap();
        upload.write(Bytes::from_static(b"hello ")).await.unwrap();
        upload.write(Bytes::from_static(b"world")).await.unwrap();
        let written = upload.finish().await.unwrap();

        assert_eq!(written, 11);
        let body = store.get("exports/1.car.zst").await.unwrap();
        assert_eq!(&body[..], b"hello world");
    }

    #[tokio::test]
    async fn aborted_upload_leaves_no_object() {
        let temp = tempdir().unwrap();
        let store = FilesystemBackend::new(temp.path()).await.unwrap();

        let mut upload = store
            .put_stream("exports/2.car.zst", PutOptions::default())
            .await
            .unwrap();
        upload.write(Bytes::from_static(b"partial")).await.unwrap();
        upload.abort().await.unwrap();

        assert!(matches!(
            store.get("exports/2.car.zst").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let temp = tempdir().unwrap();
        let store = FilesystemBackend::new(temp.path()).await.unwrap();

        assert!(matches!(
            store.get("../outside").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
