//! Shared application state.
//!
//! A single [`AppState`] is built at startup and shared across all Axum
//! handlers via `Arc`.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use keyseed_core::access::StoreScope;
use keyseed_core::barrier::Barrier;
use keyseed_core::crypto::EncryptionKey;
use keyseed_core::generator::{OsRngGenerator, SecretGenerator};
use keyseed_core::vault::VaultStore;
use keyseed_storage::{MemoryBackend, StorageBackend};

use crate::config::{ServerConfig, StorageBackendType};

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// The role-bound secret store.
    pub store: Arc<VaultStore>,
    /// Source of principal credential secrets at init.
    pub generator: Arc<dyn SecretGenerator>,
}

impl AppState {
    /// Open storage, load the master key, and verify it.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be opened, a persistent backend has no
    /// master key, the key is malformed, or it does not decrypt existing data.
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let storage = open_storage(&config.storage_backend)?;

        let key = match &config.master_key {
            Some(encoded) => {
                EncryptionKey::from_base64(encoded).context("KEYSEED_MASTER_KEY is invalid")?
            }
            None if config.storage_backend.is_persistent() => {
                anyhow::bail!("KEYSEED_MASTER_KEY is required for persistent storage");
            }
            None => {
                warn!("no master key configured, using an ephemeral key");
                EncryptionKey::generate()
            }
        };

        let store = VaultStore::new(
            Arc::new(Barrier::new(storage, key)),
            StoreScope::new(config.scope.clone()),
        );
        store
            .verify_key()
            .await
            .context("master key does not match existing data")?;

        let initialized = store.is_initialized().await?;
        info!(scope = %config.scope, initialized, "secret store ready");

        Ok(Self::new(store))
    }

    /// State over an existing store with the OS generator.
    #[must_use]
    pub fn new(store: VaultStore) -> Self {
        Self {
            store: Arc::new(store),
            generator: Arc::new(OsRngGenerator),
        }
    }

    /// A throwaway in-memory state.
    #[must_use]
    pub fn in_memory(scope: &str) -> Self {
        let barrier = Barrier::new(Arc::new(MemoryBackend::new()), EncryptionKey::generate());
        Self::new(VaultStore::new(Arc::new(barrier), StoreScope::new(scope)))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn open_storage(backend: &StorageBackendType) -> anyhow::Result<Arc<dyn StorageBackend>> {
    let storage: Arc<dyn StorageBackend> = match backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            Arc::new(MemoryBackend::new())
        }
        #[cfg(feature = "rocksdb-backend")]
        StorageBackendType::RocksDb { path } => {
            info!(path = %path, "using RocksDB storage");
            Arc::new(
                keyseed_storage::RocksDbBackend::open(path)
                    .context("failed to open RocksDB storage")?,
            )
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StorageBackendType::RocksDb { .. } => {
            anyhow::bail!("RocksDB backend requested but feature 'rocksdb-backend' is not enabled");
        }
        #[cfg(feature = "redb-backend")]
        StorageBackendType::Redb { path } => {
            info!(path = %path, "using redb storage");
            Arc::new(
                keyseed_storage::RedbBackend::open(path).context("failed to open redb storage")?,
            )
        }
        #[cfg(not(feature = "redb-backend"))]
        StorageBackendType::Redb { .. } => {
            anyhow::bail!("redb backend requested but feature 'redb-backend' is not enabled");
        }
    };
    Ok(storage)
}
