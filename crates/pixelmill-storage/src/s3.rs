use crate::traits::{ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, Result as ObjectResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// S3-backed object store.
///
/// Credentials and region come from the environment. Requests address
/// arbitrary buckets, so a client is built lazily per bucket and cached
/// for the lifetime of the store.
pub struct S3ObjectStore {
    clients: Mutex<HashMap<String, Arc<AmazonS3>>>,
}

impl S3ObjectStore {
    pub fn new() -> Self {
        S3ObjectStore {
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, bucket: &str) -> StorageResult<Arc<AmazonS3>> {
        let mut clients = self.clients.lock().expect("s3 client cache poisoned");
        if let Some(client) = clients.get(bucket) {
            return Ok(client.clone());
        }

        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket.to_string())
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        let client = Arc::new(store);
        clients.insert(bucket.to_string(), client.clone());
        Ok(client)
    }
}

impl Default for S3ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let start = std::time::Instant::now();
        let client = self.client_for(bucket)?;
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = client.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 fetch failed"
                );
                StorageError::FetchFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::FetchFailed(e.to_string()))?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = bytes.len() as u64,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 fetch successful"
        );

        Ok(bytes)
    }
}
