//! In-memory storage backend.
//!
//! Backs unit tests and `KEYSEED_STORAGE=memory` dev servers. Nothing survives
//! a restart, which also means a dev server must be re-initialised (and its
//! secrets re-provisioned) every time it starts.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{StorageBackend, StorageError};

/// A `BTreeMap` behind an async `RwLock`.
///
/// Clones share the same map, so a test can keep a handle to the backend it
/// gave to a barrier and inspect the raw ciphertext.
///
/// # Examples
///
/// ```
/// # use keyseed_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.put("secrets/admin-token", b"ciphertext").await.unwrap();
/// assert!(backend.exists("secrets/admin-token").await.unwrap());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the backend holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_owned()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.read().await.contains_key(key))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("secrets/nope").await.unwrap(), None);
        assert!(!backend.exists("secrets/nope").await.unwrap());
    }

    #[tokio::test]
    async fn put_replaces_previous_value() {
        let backend = MemoryBackend::new();
        backend.put("secrets/a", b"v1").await.unwrap();
        backend.put("secrets/a", b"v2").await.unwrap();
        assert_eq!(backend.get("secrets/a").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn list_stops_at_prefix_boundary() {
        let backend = MemoryBackend::new();
        backend.put("secrets/a", b"1").await.unwrap();
        backend.put("secrets/b", b"2").await.unwrap();
        backend.put("sys/init", b"3").await.unwrap();
        backend.put("sys/principals/x", b"4").await.unwrap();

        assert_eq!(
            backend.list("sys/principals/").await.unwrap(),
            vec!["sys/principals/x"]
        );
        assert_eq!(
            backend.list("secrets/").await.unwrap(),
            vec!["secrets/a", "secrets/b"]
        );
        assert!(backend.list("other/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let backend = MemoryBackend::new();
        let observer = backend.clone();
        assert!(observer.is_empty().await);

        backend.put("sys/init", b"1").await.unwrap();
        assert!(observer.exists("sys/init").await.unwrap());
    }
}
