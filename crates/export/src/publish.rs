//! Snapshot artifact publication.
//!
//! After a successful upload the worker publishes the checksum manifest and
//! rewrites the latest pointer. The pointer body is the snapshot's retrieval
//! URL; the same URL is stored as website-redirect metadata for stores that
//! serve redirects directly.

use crate::error::{ExportError, ExportResult};
use bytes::Bytes;
use fca_core::SnapshotDescriptor;
use fca_storage::{ObjectStore, PutOptions};
use url::Url;

/// The checksum manifest body: one `<hex-digest> *<filename>` line per
/// artifact, `sha256sum --check` compatible.
pub fn checksum_body(descriptor: &SnapshotDescriptor) -> String {
    format!("{} *{}\n", descriptor.digest_hex(), descriptor.filename)
}

/// Join the retrieval endpoint prefix and an object key into the public URL.
pub fn join_retrieval_url(prefix: &str, object_key: &str) -> ExportResult<String> {
    let mut base = Url::parse(prefix)
        .map_err(|e| ExportError::InvalidRetrievalEndpoint(format!("{prefix}: {e}")))?;

    // Without a trailing slash Url::join would replace the last path
    // segment instead of descending into it.
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }

    let joined = base
        .join(object_key)
        .map_err(|e| ExportError::InvalidRetrievalEndpoint(format!("{object_key}: {e}")))?;
    Ok(joined.to_string())
}

/// Upload the checksum manifest next to the snapshot object.
pub async fn upload_checksum(
    store: &dyn ObjectStore,
    key: &str,
    checksum_filename: &str,
    descriptor: &SnapshotDescriptor,
) -> ExportResult<()> {
    let opts = PutOptions {
        content_type: Some("text/plain".to_string()),
        content_disposition: Some(format!("attachment; filename=\"{checksum_filename}\"")),
        website_redirect: None,
    };

    store
        .put(key, Bytes::from(checksum_body(descriptor)), opts)
        .await?;
    Ok(())
}

/// Rewrite the latest pointer to the snapshot's retrieval URL.
pub async fn upload_latest(
    store: &dyn ObjectStore,
    latest_key: &str,
    retrieval_url: &str,
) -> ExportResult<()> {
    let opts = PutOptions {
        content_type: Some("text/plain".to_string()),
        content_disposition: None,
        website_redirect: Some(retrieval_url.to_string()),
    };

    store
        .put(latest_key, Bytes::from(retrieval_url.to_string()), opts)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fca_storage::FilesystemBackend;
    use tempfile::tempdir;

    fn descriptor() -> SnapshotDescriptor {
        SnapshotDescriptor {
            digest: [0x5a; 32],
            byte_size: 42,
            filename: "1234560_2024_03_04T09_05_06Z.car.zst".to_string(),
            latest_index_key: "default/latest".to_string(),
            retrieval_url: "https://snapshots.example.net/default/1234560_2024_03_04T09_05_06Z.car.zst"
                .to_string(),
        }
    }

    #[test]
    fn checksum_body_is_sha256sum_compatible() {
        let body = checksum_body(&descriptor());
        assert_eq!(
            body,
            format!("{} *1234560_2024_03_04T09_05_06Z.car.zst\n", "5a".repeat(32))
        );
    }

    #[test]
    fn retrieval_url_is_joined_not_concatenated() {
        // No trailing slash on the prefix: joining must still descend.
        let url = join_retrieval_url(
            "https://snapshots.example.net/archive",
            "default/1_2024_01_01T00_00_00Z.car.zst",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://snapshots.example.net/archive/default/1_2024_01_01T00_00_00Z.car.zst"
        );

        let url = join_retrieval_url(
            "https://snapshots.example.net/archive/",
            "default/1_2024_01_01T00_00_00Z.car.zst",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://snapshots.example.net/archive/default/1_2024_01_01T00_00_00Z.car.zst"
        );
    }

    #[test]
    fn bad_retrieval_prefix_is_rejected() {
        assert!(matches!(
            join_retrieval_url("not a url", "key"),
            Err(ExportError::InvalidRetrievalEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn latest_pointer_body_is_the_retrieval_url() {
        let temp = tempdir().unwrap();
        let store = FilesystemBackend::new(temp.path()).await.unwrap();
        let d = descriptor();

        upload_latest(&store, &d.latest_index_key, &d.retrieval_url)
            .await
            .unwrap();

        let body = store.get(&d.latest_index_key).await.unwrap();
        assert_eq!(std::str::from_utf8(&body).unwrap(), d.retrieval_url);
    }

    #[tokio::test]
    async fn checksum_object_round_trips() {
        let temp = tempdir().unwrap();
        let store = FilesystemBackend::new(temp.path()).await.unwrap();
        let d = descriptor();

        upload_checksum(
            &store,
            "default/1234560_2024_03_04T09_05_06Z.sha256sum",
            "1234560_2024_03_04T09_05_06Z.sha256sum",
            &d,
        )
        .await
        .unwrap();

        let body = store
            .get("default/1234560_2024_03_04T09_05_06Z.sha256sum")
            .await
            .unwrap();
        assert_eq!(std::str::from_utf8(&body).unwrap(), checksum_body(&d));
    }
}
