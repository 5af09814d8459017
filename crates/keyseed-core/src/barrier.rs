//! Encryption barrier.
//!
//! Every value that reaches the storage backend passes through
//! [`Barrier::put`] and is AES-256-GCM encrypted under the master key. Keys
//! (storage paths) stay in plaintext so prefix listing works without an index.
//!
//! The master key lives only in process memory. A barrier opened with the
//! wrong key still lists and probes keys, but the first [`Barrier::get`]
//! fails with [`BarrierError::Crypto`].

use std::fmt;
use std::sync::Arc;

use keyseed_storage::StorageBackend;

use crate::crypto::{self, EncryptionKey};
use crate::error::BarrierError;

/// Encrypting wrapper around a [`StorageBackend`].
pub struct Barrier {
    storage: Arc<dyn StorageBackend>,
    key: EncryptionKey,
}

impl Barrier {
    /// Wrap `storage`, encrypting under `key`.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, key: EncryptionKey) -> Self {
        Self { storage, key }
    }

    /// Read and decrypt the value under `key`.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::Storage`] if the backend fails.
    /// - [`BarrierError::Crypto`] if the stored blob does not decrypt.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BarrierError> {
        match self.storage.get(key).await? {
            Some(blob) => Ok(Some(crypto::decrypt(&self.key, &blob)?)),
            None => Ok(None),
        }
    }

    /// Encrypt `value` and store it under `key`.
    ///
    /// # Errors
    ///
    /// - [`BarrierError::Crypto`] if encryption fails.
    /// - [`BarrierError::Storage`] if the backend fails.
    pub async fn put(&self, key: &str, value: &[u8]) -> Result<(), BarrierError> {
        let blob = crypto::encrypt(&self.key, value)?;
        self.storage.put(key, &blob).await?;
        Ok(())
    }

    /// Report whether `key` is present. Nothing is decrypted.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::Storage`] if the backend fails.
    pub async fn exists(&self, key: &str) -> Result<bool, BarrierError> {
        Ok(self.storage.exists(key).await?)
    }

    /// List keys under `prefix`. Nothing is decrypted.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::Storage`] if the backend fails.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, BarrierError> {
        Ok(self.storage.list(prefix).await?)
    }
}

impl fmt::Debug for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Barrier").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use keyseed_storage::MemoryBackend;

    fn barrier_over(storage: &MemoryBackend, key: EncryptionKey) -> Barrier {
        Barrier::new(Arc::new(storage.clone()), key)
    }

    #[tokio::test]
    async fn put_then_get_returns_plaintext() {
        let barrier = barrier_over(&MemoryBackend::new(), EncryptionKey::generate());
        barrier.put("secrets/admin-token", b"record").await.unwrap();
        assert_eq!(
            barrier.get("secrets/admin-token").await.unwrap(),
            Some(b"record".to_vec())
        );
        assert_eq!(barrier.get("secrets/other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn backend_only_sees_ciphertext() {
        let storage = MemoryBackend::new();
        let barrier = barrier_over(&storage, EncryptionKey::generate());
        barrier.put("secrets/db-password", b"S3cur3Pass").await.unwrap();

        let raw = storage.get("secrets/db-password").await.unwrap().unwrap();
        assert!(!raw.windows(10).any(|w| w == b"S3cur3Pass"));
    }

    #[tokio::test]
    async fn wrong_key_fails_on_read_but_not_on_probe() {
        let storage = MemoryBackend::new();
        barrier_over(&storage, EncryptionKey::generate())
            .put("sys/init", b"record")
            .await
            .unwrap();

        let other = barrier_over(&storage, EncryptionKey::generate());
        assert!(other.exists("sys/init").await.unwrap());
        assert!(matches!(
            other.get("sys/init").await,
            Err(BarrierError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn same_key_reads_across_barrier_instances() {
        let storage = MemoryBackend::new();
        let key = EncryptionKey::generate();
        barrier_over(&storage, key.clone())
            .put("sys/init", b"persisted")
            .await
            .unwrap();

        let reopened = barrier_over(&storage, key);
        assert_eq!(
            reopened.get("sys/init").await.unwrap(),
            Some(b"persisted".to_vec())
        );
    }

    #[tokio::test]
    async fn list_returns_plain_keys() {
        let barrier = barrier_over(&MemoryBackend::new(), EncryptionKey::generate());
        barrier.put("secrets/a", b"1").await.unwrap();
        barrier.put("secrets/b", b"2").await.unwrap();
        barrier.put("sys/init", b"3").await.unwrap();
        assert_eq!(
            barrier.list("secrets/").await.unwrap(),
            vec!["secrets/a", "secrets/b"]
        );
    }
}
