//! Durable key-value storage on the device.
//!
//! # Architecture
//!
//! - [`KeyValueStorage`] is the seam: string keys, string values, async,
//!   best-effort (callers log failures and carry on)
//! - [`keys`] holds the key naming convention shared with installed clients
//! - [`MemoryStorage`] for tests and ephemeral sessions, [`FileStorage`] for a
//!   single JSON file on disk

mod file;
pub mod keys;
mod memory;

pub use file::FileStorage;
pub use keys::StorageKey;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when reading or writing device storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Asynchronous string key-value storage.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a key. Deleting an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Delete several keys.
    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}
