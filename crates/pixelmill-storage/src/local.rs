use crate::traits::{ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;

/// Local filesystem object store.
///
/// Buckets map to directories under the base path. Keys are validated so
/// a crafted bucket or key cannot escape the storage root.
#[derive(Clone)]
pub struct LocalObjectStore {
    base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        LocalObjectStore {
            base_path: base_path.into(),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        for segment in [bucket, key] {
            if segment.is_empty() || segment.contains("..") || segment.starts_with('/') {
                return Err(StorageError::InvalidKey(format!(
                    "invalid bucket or key: {}/{}",
                    bucket, key
                )));
            }
        }
        Ok(self.base_path.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path).await {
            Ok(data) => {
                tracing::debug!(
                    bucket = %bucket,
                    key = %key,
                    size_bytes = data.len() as u64,
                    "local fetch successful"
                );
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let bucket_dir = dir.path().join("photos");
        std::fs::create_dir_all(&bucket_dir).unwrap();
        std::fs::write(bucket_dir.join("cat.jpg"), b"jpeg bytes").unwrap();

        let store = LocalObjectStore::new(dir.path());
        let bytes = store.get("photos", "cat.jpg").await.unwrap();
        assert_eq!(&bytes[..], b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let err = store.get("photos", "nope.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let err = store.get("photos", "../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));

        let err = store.get("..", "key").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));

        let err = store.get("photos", "/abs/path").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
