//! Crate-level error type.
//!
//! Collaborator errors convert into [`ClientError`] so internal helpers can
//! use `?` across seams. The store never returns it to callers: failures are
//! logged and turned into data at the public boundary.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::push::PushError;
use crate::storage::StorageError;

/// Any failure inside the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Device storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Backend API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Push channel operation failed.
    #[error("Push error: {0}")]
    Push(#[from] PushError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
