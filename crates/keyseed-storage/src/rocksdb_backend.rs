//! `RocksDB` storage backend, the persistent default.
//!
//! `RocksDB` is a synchronous C++ library, so each call is shipped to the
//! blocking pool through [`run_blocking`](crate::run_blocking).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options};
use tracing::debug;

use crate::{StorageBackend, StorageError, run_blocking};

type Db = DBWithThreadMode<MultiThreaded>;

/// Persistent backend over a `RocksDB` directory.
///
/// # Examples
///
/// ```no_run
/// # use keyseed_storage::RocksDbBackend;
/// let backend = RocksDbBackend::open("/var/lib/keyseed/data").unwrap();
/// ```
#[derive(Clone)]
pub struct RocksDbBackend {
    db: Arc<Db>,
    path: PathBuf,
}

impl std::fmt::Debug for RocksDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RocksDbBackend {
    /// Open (or create) the database directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if `RocksDB` refuses the directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = Db::open(&opts, path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "rocksdb opened");

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Directory this backend was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl StorageBackend for RocksDbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let owned = key.to_owned();
        let panic_key = owned.clone();
        run_blocking(
            move || {
                db.get(owned.as_bytes()).map_err(|e| StorageError::Read {
                    key: owned.clone(),
                    reason: e.to_string(),
                })
            },
            |reason| StorageError::Read {
                key: panic_key,
                reason,
            },
        )
        .await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let owned = key.to_owned();
        let panic_key = owned.clone();
        let value = value.to_vec();
        run_blocking(
            move || {
                db.put(owned.as_bytes(), &value)
                    .map_err(|e| StorageError::Write {
                        key: owned.clone(),
                        reason: e.to_string(),
                    })
            },
            |reason| StorageError::Write {
                key: panic_key,
                reason,
            },
        )
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let db = Arc::clone(&self.db);
        let owned = prefix.to_owned();
        let panic_prefix = owned.clone();
        run_blocking(
            move || {
                let mut keys = Vec::new();
                let iter = db.iterator(IteratorMode::From(owned.as_bytes(), Direction::Forward));
                for item in iter {
                    let (raw, _) = item.map_err(|e| StorageError::List {
                        prefix: owned.clone(),
                        reason: e.to_string(),
                    })?;
                    let key = String::from_utf8(raw.to_vec()).map_err(|e| {
                        StorageError::InvalidKey {
                            reason: e.to_string(),
                        }
                    })?;
                    if !key.starts_with(&owned) {
                        break;
                    }
                    keys.push(key);
                }
                Ok(keys)
            },
            |reason| StorageError::List {
                prefix: panic_prefix,
                reason,
            },
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = RocksDbBackend::open(dir.path()).unwrap();
            backend.put("secrets/db-password", b"ct").await.unwrap();
        }
        let backend = RocksDbBackend::open(dir.path()).unwrap();
        assert_eq!(
            backend.get("secrets/db-password").await.unwrap(),
            Some(b"ct".to_vec())
        );
    }

    #[tokio::test]
    async fn list_is_prefix_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RocksDbBackend::open(dir.path()).unwrap();
        backend.put("secrets/a", b"1").await.unwrap();
        backend.put("sys/init", b"2").await.unwrap();
        assert_eq!(backend.list("secrets/").await.unwrap(), vec!["secrets/a"]);
    }
}
