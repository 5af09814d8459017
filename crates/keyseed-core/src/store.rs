//! The secret store contract and the capability handles built on it.
//!
//! [`SecretStore`] is what the provisioning job and the workload binding
//! consume. It is implemented locally by [`VaultStore`](crate::vault::VaultStore)
//! and remotely by the CLI's HTTP client.
//!
//! Nobody calls the trait with a bare credential outside this module's
//! handles: [`SecretWriter`] only offers `exists`/`set`, [`SecretReader`] only
//! offers `get`. Holding a reader handle gives no way to even attempt a write.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::access::{Credential, ReaderCredential, WriterCredential};
use crate::error::StoreError;
use crate::secret::{SecretName, SecretValue};

/// Store operation, used in permission errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreOperation {
    Exists,
    Get,
    Set,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists => f.write_str("exists"),
            Self::Get => f.write_str("get"),
            Self::Set => f.write_str("set"),
        }
    }
}

/// A key/value store for sensitive strings, gated by role bindings.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Whether a record is present under `name`. Never reveals the value.
    async fn exists(&self, credential: &Credential, name: &SecretName) -> Result<bool, StoreError>;

    /// Create or overwrite the record under `name`.
    async fn set(
        &self,
        credential: &Credential,
        name: &SecretName,
        value: &SecretValue,
    ) -> Result<(), StoreError>;

    /// Read the current value under `name`.
    async fn get(&self, credential: &Credential, name: &SecretName)
    -> Result<SecretValue, StoreError>;
}

/// Write-side handle: a store plus the Writer credential.
#[derive(Clone)]
pub struct SecretWriter {
    store: Arc<dyn SecretStore>,
    credential: WriterCredential,
}

impl SecretWriter {
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, credential: WriterCredential) -> Self {
        Self { store, credential }
    }

    /// See [`SecretStore::exists`].
    ///
    /// # Errors
    ///
    /// Propagates the store's [`StoreError`].
    pub async fn exists(&self, name: &SecretName) -> Result<bool, StoreError> {
        self.store.exists(self.credential.credential(), name).await
    }

    /// See [`SecretStore::set`].
    ///
    /// # Errors
    ///
    /// Propagates the store's [`StoreError`].
    pub async fn set(&self, name: &SecretName, value: &SecretValue) -> Result<(), StoreError> {
        self.store
            .set(self.credential.credential(), name, value)
            .await
    }
}

impl fmt::Debug for SecretWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretWriter")
            .field("principal", &self.credential.credential().principal())
            .finish_non_exhaustive()
    }
}

/// Read-side handle: a store plus the Reader credential.
#[derive(Clone)]
pub struct SecretReader {
    store: Arc<dyn SecretStore>,
    credential: ReaderCredential,
}

impl SecretReader {
    #[must_use]
    pub fn new(store: Arc<dyn SecretStore>, credential: ReaderCredential) -> Self {
        Self { store, credential }
    }

    /// See [`SecretStore::get`].
    ///
    /// # Errors
    ///
    /// Propagates the store's [`StoreError`].
    pub async fn get(&self, name: &SecretName) -> Result<SecretValue, StoreError> {
        self.store.get(self.credential.credential(), name).await
    }
}

impl fmt::Debug for SecretReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretReader")
            .field("principal", &self.credential.credential().principal())
            .finish_non_exhaustive()
    }
}
