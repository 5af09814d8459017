//! Server configuration.
//!
//! Read once at startup from `KEYSEED_*` environment variables. Anything
//! missing or unparsable falls back to its default.

use std::fmt;
use std::net::SocketAddr;

const DEFAULT_PORT: u16 = 8300;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Base64 master key. Required for persistent backends.
    pub master_key: Option<String>,
    /// Name of this store instance, recorded in every role binding.
    pub scope: String,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Whether to skip `mlock` (for development without root/`CAP_IPC_LOCK`).
    pub disable_mlock: bool,
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// `RocksDB` persistent storage.
    RocksDb { path: String },
    /// Redb persistent storage.
    Redb { path: String },
}

impl StorageBackendType {
    /// Whether data survives a restart.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `KEYSEED_BIND_ADDR`: full bind address (default `127.0.0.1:8300`)
    /// - `PORT`: port on `0.0.0.0`, used when `KEYSEED_BIND_ADDR` is unset
    /// - `KEYSEED_STORAGE`: `memory`, `rocksdb`, or `redb` (default `memory`)
    /// - `KEYSEED_STORAGE_PATH`: path for persistent backends (default `./data`)
    /// - `KEYSEED_MASTER_KEY`: base64 32-byte master key
    /// - `KEYSEED_SCOPE`: store instance name (default `keyseed`)
    /// - `KEYSEED_LOG_LEVEL`: log filter (default `info`)
    /// - `KEYSEED_DISABLE_MLOCK`: skip `mlockall` (default `false`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_addr = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT));
        let bind_addr = if let Some(addr) = var("KEYSEED_BIND_ADDR") {
            addr.parse().unwrap_or(default_addr)
        } else if let Some(port) = var("PORT") {
            SocketAddr::from(([0, 0, 0, 0], port.parse().unwrap_or(DEFAULT_PORT)))
        } else {
            default_addr
        };

        let storage_path = var("KEYSEED_STORAGE_PATH").unwrap_or_else(|| "./data".to_owned());
        let storage_backend = match var("KEYSEED_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "rocksdb" => StorageBackendType::RocksDb { path: storage_path },
            "redb" => StorageBackendType::Redb { path: storage_path },
            _ => StorageBackendType::Memory,
        };

        Self {
            bind_addr,
            storage_backend,
            master_key: var("KEYSEED_MASTER_KEY").filter(|k| !k.trim().is_empty()),
            scope: var("KEYSEED_SCOPE")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "keyseed".to_owned()),
            log_level: var("KEYSEED_LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
            disable_mlock: var("KEYSEED_DISABLE_MLOCK").is_some_and(|v| v == "true" || v == "1"),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage_backend", &self.storage_backend)
            .field("master_key", &self.master_key.as_ref().map(|_| "[REDACTED]"))
            .field("scope", &self.scope)
            .field("log_level", &self.log_level)
            .field("disable_mlock", &self.disable_mlock)
            .finish()
    }
}
