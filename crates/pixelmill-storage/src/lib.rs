//! Pixelmill storage backends
//!
//! Read-only object access for source and overlay images. The `ObjectStore`
//! trait is bucket-scoped per call; backends cover S3, the local filesystem
//! and an in-memory store for tests.

pub mod local;
pub mod memory;
pub mod s3;
pub mod traits;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;
pub use traits::{ObjectStore, StorageError, StorageResult};
