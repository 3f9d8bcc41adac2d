//! Storage abstraction trait
//!
//! The pipeline only ever reads source and overlay images, so the contract
//! is a single bucket-scoped fetch. Backends must distinguish a missing
//! object from an infrastructure failure.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Read-only object access by bucket and key.
///
/// Unlike a single-bucket store, the bucket travels with each call: one
/// request can pull its source image and its overlay from different
/// buckets.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the full contents of an object.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;
}
