//! # pixmill-storage
//!
//! Storage backend implementations for Pixmill: local filesystem and
//! S3-compatible object stores, both behind the
//! [`StorageBackend`](pixmill_core::traits::storage::StorageBackend)
//! trait from `pixmill-core`.

pub mod providers;

use std::sync::Arc;

use pixmill_core::config::{StorageConfig, StorageMode};
use pixmill_core::result::AppResult;
use pixmill_core::traits::storage::StorageBackend;

use providers::local::LocalBackend;
use providers::s3::S3Backend;

/// Build the storage backend selected by configuration.
pub async fn build_backend(config: &StorageConfig) -> AppResult<Arc<dyn StorageBackend>> {
    match config.mode {
        StorageMode::Local => Ok(Arc::new(LocalBackend::new(".").await?)),
        StorageMode::S3 => Ok(Arc::new(S3Backend::new(&config.s3).await?)),
    }
}
