//! Storage error types.
//!
//! Variants name the key, prefix, or path involved. They never carry values:
//! everything stored here is ciphertext anyway, but there is no reason to
//! print it.

/// Errors raised by a [`StorageBackend`](crate::StorageBackend).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be opened at `path`.
    #[error("failed to open storage at '{path}': {reason}")]
    Open { path: String, reason: String },

    /// Reading `key` failed.
    #[error("failed to read key '{key}': {reason}")]
    Read { key: String, reason: String },

    /// Writing `key` failed.
    #[error("failed to write key '{key}': {reason}")]
    Write { key: String, reason: String },

    /// Listing keys under `prefix` failed.
    #[error("failed to list keys under '{prefix}': {reason}")]
    List { prefix: String, reason: String },

    /// The backing table does not exist and could not be created.
    #[error("missing table '{name}'")]
    MissingTable { name: String },

    /// A backend transaction could not be started or committed.
    #[error("storage transaction failed: {reason}")]
    Transaction { reason: String },

    /// A stored key was not valid UTF-8.
    #[error("invalid key encoding: {reason}")]
    InvalidKey { reason: String },
}
