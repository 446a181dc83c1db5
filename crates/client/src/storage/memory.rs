//! In-process storage backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KeyValueStorage, StorageError};

/// Storage kept in a map for the life of the process.
///
/// Writes can be switched to fail, which is how the best-effort persistence
/// paths of the store are exercised.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`remove` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Whether a key is currently stored.
    pub async fn contains_key(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.entries
            .write()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let storage = MemoryStorage::new();
        storage.set("@kaptaze_user_token", "tok").await.unwrap();
        assert_eq!(
            storage.get("@kaptaze_user_token").await.unwrap().as_deref(),
            Some("tok")
        );

        storage.remove("@kaptaze_user_token").await.unwrap();
        assert!(storage.get("@kaptaze_user_token").await.unwrap().is_none());
        storage.remove("@kaptaze_user_token").await.unwrap();
    }

    #[tokio::test]
    async fn test_multi_remove() {
        let storage = MemoryStorage::new();
        for key in ["a", "b", "c"] {
            storage.set(key, "1").await.unwrap();
        }
        storage
            .multi_remove(&["a".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(storage.keys().await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let storage = MemoryStorage::new();
        storage.set("k", "v").await.unwrap();
        storage.set_fail_writes(true);

        assert!(matches!(
            storage.set("k", "w").await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(storage.remove("k").await.is_err());
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
