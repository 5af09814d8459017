//! Storage backend abstraction for keyseed.
//!
//! [`StorageBackend`] is a plain key/value interface. It has no notion of
//! secrets, principals, or encryption: the barrier in `keyseed-core` encrypts
//! every value before it is handed to a backend, so implementations only ever
//! hold ciphertext.
//!
//! Backends:
//!
//! - [`MemoryBackend`]: in-process, for tests and throwaway dev servers
//! - [`RocksDbBackend`]: persistent default (feature `rocksdb-backend`)
//! - [`RedbBackend`]: pure-Rust persistent backend (feature `redb-backend`)

mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;
#[cfg(feature = "rocksdb-backend")]
mod rocksdb_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_backend::RocksDbBackend;

/// A key/value store for opaque bytes.
///
/// Keys are `/`-separated UTF-8 paths such as `secrets/admin-token` or
/// `sys/init`. Nothing is ever deleted through this interface:
/// secret records are only created or rotated, never removed by keyseed.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Fetch the value stored under `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Return every key starting with `prefix`, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Report whether `key` is present without returning its value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Run a blocking backend call on the Tokio blocking pool.
///
/// A panicking closure is reported through `on_panic` instead of poisoning
/// the caller.
#[cfg(any(feature = "rocksdb-backend", feature = "redb-backend"))]
pub(crate) async fn run_blocking<T, F>(
    op: F,
    on_panic: impl FnOnce(String) -> StorageError,
) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(result) => result,
        Err(join) => Err(on_panic(format!("blocking task failed: {join}"))),
    }
}
