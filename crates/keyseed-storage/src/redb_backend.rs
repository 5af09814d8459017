//! redb storage backend.
//!
//! For builds that must avoid the `RocksDB` C++ toolchain. Everything lives
//! in one table; namespacing (`secrets/`, `sys/`) is done by the callers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::{StorageBackend, StorageError, run_blocking};

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

fn txn_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

fn table_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::MissingTable {
        name: format!("entries: {e}"),
    }
}

/// Persistent backend over a single redb file.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open (or create) the database file at `path` and make sure the
    /// entries table exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be created, or
    /// [`StorageError::Transaction`] if the table cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let txn = db.begin_write().map_err(txn_err)?;
        txn.open_table(ENTRIES).map_err(table_err)?;
        txn.commit().map_err(txn_err)?;

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// File this backend was opened at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let owned = key.to_owned();
        let panic_key = owned.clone();
        run_blocking(
            move || {
                let txn = db.begin_read().map_err(txn_err)?;
                let table = txn.open_table(ENTRIES).map_err(table_err)?;
                let value = table
                    .get(owned.as_str())
                    .map_err(|e| StorageError::Read {
                        key: owned.clone(),
                        reason: e.to_string(),
                    })?
                    .map(|guard| guard.value().to_vec());
                Ok(value)
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
                let txn = db.begin_write().map_err(txn_err)?;
                {
                    let mut table = txn.open_table(ENTRIES).map_err(table_err)?;
                    table
                        .insert(owned.as_str(), value.as_slice())
                        .map_err(|e| StorageError::Write {
                            key: owned.clone(),
                            reason: e.to_string(),
                        })?;
                }
                txn.commit().map_err(txn_err)
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
                let list_err = |e: &dyn std::fmt::Display| StorageError::List {
                    prefix: owned.clone(),
                    reason: e.to_string(),
                };
                let txn = db.begin_read().map_err(txn_err)?;
                let table = txn.open_table(ENTRIES).map_err(table_err)?;
                let mut keys = Vec::new();
                for item in table.range(owned.as_str()..).map_err(|e| list_err(&e))? {
                    let (k, _) = item.map_err(|e| list_err(&e))?;
                    let key = k.value();
                    if !key.starts_with(owned.as_str()) {
                        break;
                    }
                    keys.push(key.to_owned());
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
    async fn roundtrip_and_prefix_listing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("keyseed.redb")).unwrap();
        backend.put("secrets/admin-token", b"ct1").await.unwrap();
        backend.put("sys/init", b"ct2").await.unwrap();

        assert_eq!(
            backend.get("secrets/admin-token").await.unwrap(),
            Some(b"ct1".to_vec())
        );
        assert_eq!(
            backend.list("secrets/").await.unwrap(),
            vec!["secrets/admin-token"]
        );
        assert!(backend.exists("sys/init").await.unwrap());
    }
}
