//! Error types for `keyseed-core`.
//!
//! Every variant names the secret, principal, or operation involved so a
//! failed deployment can be diagnosed from its log alone. No variant ever
//! carries a secret value or a credential.

use keyseed_storage::StorageError;

use crate::store::StoreOperation;

/// Errors from the AES-256-GCM primitives.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Encryption failed inside the AEAD.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// Decryption failed: wrong key, corrupted ciphertext, or tampered tag.
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// The stored blob cannot even hold a nonce and a tag.
    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    /// An operator-supplied master key could not be decoded.
    #[error("invalid master key: {reason}")]
    InvalidKey { reason: String },
}

/// Errors from the encryption barrier.
#[derive(Debug, thiserror::Error)]
pub enum BarrierError {
    /// Encrypting or decrypting a value failed.
    #[error("barrier crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The storage backend failed.
    #[error("barrier storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from secret generation.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// The operating system's random source could not be read. Never retried:
    /// a weaker fallback is not acceptable for credentials.
    #[error("entropy source unavailable: {reason}")]
    EntropySourceUnavailable { reason: String },
}

/// A logical secret name that breaks the naming rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid secret name '{name}': {reason}")]
pub struct InvalidSecretName {
    /// The rejected name.
    pub name: String,
    /// Which rule it broke.
    pub reason: &'static str,
}

/// A role binding whose permission set violates the writer/reader invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("role binding for principal {principal} is invalid: {reason}")]
pub struct InvalidRoleBinding {
    /// Principal the binding belongs to.
    pub principal: String,
    /// Which invariant failed.
    pub reason: &'static str,
}

/// Errors from a [`SecretStore`](crate::store::SecretStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The bearer credential does not have the `<principal>.<secret>` shape.
    #[error("malformed credential")]
    MalformedCredential,

    /// The credential does not belong to any principal of this store.
    #[error("credential not recognised by the secret store")]
    Unauthenticated,

    /// The principal is known but its binding does not allow the operation.
    #[error("permission denied: {operation} on secret '{name}'")]
    PermissionDenied {
        operation: StoreOperation,
        name: String,
    },

    /// No record exists under `name`.
    #[error("secret '{name}' does not exist")]
    NotFound { name: String },

    /// `initialize` was called on a store that already has principals.
    #[error("secret store is already initialized")]
    AlreadyInitialized,

    /// The store has no principals yet.
    #[error("secret store is not initialized")]
    NotInitialized,

    /// A name failed validation.
    #[error(transparent)]
    InvalidName(#[from] InvalidSecretName),

    /// A persisted role binding failed validation.
    #[error(transparent)]
    InvalidBinding(#[from] InvalidRoleBinding),

    /// Credential generation failed during initialisation.
    #[error("secret store credential generation failed: {0}")]
    Generator(#[from] GeneratorError),

    /// The remote store could not be reached or answered unexpectedly.
    #[error("secret store unreachable: {reason}")]
    Transport { reason: String },

    /// The barrier failed.
    #[error("secret store barrier error: {0}")]
    Barrier(#[from] BarrierError),

    /// Serialization or another internal failure.
    #[error("secret store internal error: {reason}")]
    Internal { reason: String },
}

/// Errors that abort a provisioning run.
///
/// Each per-secret variant names the secret that stopped the run. Secrets
/// created earlier in the same run stay in place; re-running is safe.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The generator could not read its random source.
    #[error("secret '{name}': entropy source unavailable: {reason}")]
    EntropySourceUnavailable { name: String, reason: String },

    /// A supplied-value secret is absent from the store and no value was
    /// passed through the secure parameter channel.
    #[error("secret '{name}': no supplied value was provided")]
    MissingSuppliedValue { name: String },

    /// The writer's role binding is missing, not yet effective, or wrong.
    #[error("secret '{name}': secret store denied {operation}")]
    StorePermissionDenied {
        name: String,
        operation: StoreOperation,
    },

    /// Any other store failure.
    #[error("secret '{name}': {source}")]
    Store {
        name: String,
        #[source]
        source: StoreError,
    },

    /// Two descriptors share a name.
    #[error("duplicate secret descriptor '{name}'")]
    DuplicateDescriptor { name: String },

    /// The run exceeded its time bound.
    #[error("provisioning did not finish within {secs}s")]
    TimedOut { secs: u64 },
}

impl ProvisionError {
    /// Short machine-readable failure kind, used as a log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntropySourceUnavailable { .. } => "entropy_source_unavailable",
            Self::MissingSuppliedValue { .. } => "missing_supplied_value",
            Self::StorePermissionDenied { .. } => "store_permission_denied",
            Self::Store { .. } => "store",
            Self::DuplicateDescriptor { .. } => "duplicate_descriptor",
            Self::TimedOut { .. } => "timed_out",
        }
    }

    /// The secret this failure is attributed to, if any.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        match self {
            Self::EntropySourceUnavailable { name, .. }
            | Self::MissingSuppliedValue { name }
            | Self::StorePermissionDenied { name, .. }
            | Self::Store { name, .. }
            | Self::DuplicateDescriptor { name } => Some(name),
            Self::TimedOut { .. } => None,
        }
    }
}

/// Invalid workload binding configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    /// Not a usable environment variable name.
    #[error("invalid environment variable name '{name}'")]
    InvalidEnvVar { name: String },

    /// The environment variable would carry the literal store key name.
    #[error("environment variable '{name}' must not be the secret's store key name")]
    EnvVarIsStoreKey { name: String },

    /// Two references target the same environment variable.
    #[error("environment variable '{name}' is bound more than once")]
    DuplicateEnvVar { name: String },
}

/// A workload could not resolve one of its secret references.
///
/// Fails the workload start or refresh; there is no default value.
#[derive(Debug, thiserror::Error)]
#[error("cannot resolve {env_var} from secret '{secret}': {reason}")]
pub struct SecretResolutionError {
    /// Environment variable that was being populated.
    pub env_var: String,
    /// Secret it references.
    pub secret: String,
    /// Why the store refused.
    #[source]
    pub reason: StoreError,
}

/// Errors loading a deployment manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest '{path}': {reason}")]
    Io { path: String, reason: String },

    /// The manifest is not valid JSON for the expected shape.
    #[error("failed to parse manifest: {reason}")]
    Parse { reason: String },

    /// The manifest lists no secrets.
    #[error("manifest declares no secrets")]
    Empty,

    /// A secret appears twice.
    #[error("secret '{name}' is declared more than once")]
    DuplicateSecret { name: String },

    /// A supplied-value secret does not say which channel carries its value.
    #[error("secret '{name}' uses supplied-value but has no supplied_from")]
    MissingSuppliedFrom { name: String },

    /// A secret name is invalid.
    #[error(transparent)]
    InvalidName(#[from] InvalidSecretName),

    /// A workload binding is invalid.
    #[error(transparent)]
    Binding(#[from] BindingError),
}
