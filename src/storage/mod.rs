//! Object storage layer
//!
//! Binary payloads live in an object store addressed by string keys.
//! Two backends are available:
//! - In-memory store, default, for development and tests
//! - S3-compatible store (AWS, MinIO, Yandex Object Storage, ...)
//!
//! The backend is selected from `StorageConfig`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use becore::storage::{create_object_store, file_key};
//!
//! let store = create_object_store(&config.storage)?;
//! store.put(&file_key(id), bytes, "image/png").await?;
//! ```

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageDriver};

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Payload read back from the store
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// Errors raised by an object store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Object storage request failed: {message}")]
    Upstream {
        /// HTTP status reported by the store, when a response was received
        status: Option<u16>,
        message: String,
    },
}

impl StorageError {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Key/value store for binary objects.
///
/// Every call is idempotent by key. Deleting a key that does not exist
/// succeeds, mirroring S3 semantics.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous object
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError>;

    /// Fetch the object stored under `key`
    async fn get(&self, key: &str) -> Result<StoredObject, StorageError>;

    /// Remove the object stored under `key`
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// Type alias for a shared object store
pub type DynObjectStore = Arc<dyn ObjectStore>;

/// Key of a managed file's payload
pub fn file_key(id: Uuid) -> String {
    format!("files/{}", id.hyphenated())
}

/// Key of a raw image uploaded through the passthrough endpoints
pub fn image_key(id: Uuid) -> String {
    format!("images/{}", id.hyphenated())
}

/// Create an object store from configuration.
pub fn create_object_store(config: &StorageConfig) -> anyhow::Result<DynObjectStore> {
    config.validate()?;
    match config.driver {
        StorageDriver::Memory => {
            tracing::info!("Using in-memory object store");
            Ok(Arc::new(MemoryObjectStore::new()))
        }
        StorageDriver::S3 => {
            tracing::info!(
                bucket = %config.bucket,
                endpoint = config.service_url.as_deref().unwrap_or("aws"),
                "Using S3 object store"
            );
            Ok(Arc::new(S3ObjectStore::new(config)))
        }
    }
}
