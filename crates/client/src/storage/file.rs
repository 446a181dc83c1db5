//! Single-file JSON storage backend.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{KeyValueStorage, StorageError};

/// Storage persisted as one JSON object file.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so a crash leaves either the old or the new contents. Operations
/// are serialized by an internal lock.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    /// Use (or later create) the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), keys = entries.len(), "Storage file written");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    #[instrument(skip(self, value), fields(path = %self.path.display()))]
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_owned(), value.to_owned());
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.multi_remove(&[key.to_owned()]).await
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let before = entries.len();
        for key in keys {
            entries.remove(key);
        }
        if entries.len() == before {
            return Ok(());
        }
        self.save(&entries).await
    }
}
