//! Workload-side secret resolution.
//!
//! A [`WorkloadSecretBinding`] maps environment variable names (named for
//! what the value is for, e.g. `DATABASE_PASSWORD`) to store keys. At start
//! and at every refresh the workload calls [`resolve`](WorkloadSecretBinding::resolve)
//! with its Reader handle. Any failure aborts the start; there is no default.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

use crate::error::{BindingError, SecretResolutionError};
use crate::secret::{SecretName, SecretValue};
use crate::store::SecretReader;

/// One environment variable backed by one secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    env_var: String,
    secret: SecretName,
}

impl SecretReference {
    /// # Errors
    ///
    /// Returns [`BindingError::InvalidEnvVar`] unless `env_var` matches
    /// `[A-Za-z_][A-Za-z0-9_]*`, and [`BindingError::EnvVarIsStoreKey`] if
    /// it spells the store key itself (compared case-insensitively).
    pub fn new(env_var: impl Into<String>, secret: SecretName) -> Result<Self, BindingError> {
        let env_var = env_var.into();
        if !is_env_name(&env_var) {
            return Err(BindingError::InvalidEnvVar { name: env_var });
        }
        if env_var.eq_ignore_ascii_case(secret.as_str()) {
            return Err(BindingError::EnvVarIsStoreKey { name: env_var });
        }
        Ok(Self { env_var, secret })
    }

    #[must_use]
    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    #[must_use]
    pub fn secret(&self) -> &SecretName {
        &self.secret
    }
}

fn is_env_name(s: &str) -> bool {
    let mut bytes = s.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// The set of secret references a workload declares.
#[derive(Debug, Clone, Default)]
pub struct WorkloadSecretBinding {
    references: Vec<SecretReference>,
}

impl WorkloadSecretBinding {
    /// # Errors
    ///
    /// Returns [`BindingError::DuplicateEnvVar`] if two references share an
    /// environment variable.
    pub fn new(references: Vec<SecretReference>) -> Result<Self, BindingError> {
        let mut seen = HashSet::new();
        for r in &references {
            if !seen.insert(r.env_var.as_str()) {
                return Err(BindingError::DuplicateEnvVar {
                    name: r.env_var.clone(),
                });
            }
        }
        Ok(Self { references })
    }

    #[must_use]
    pub fn references(&self) -> &[SecretReference] {
        &self.references
    }

    /// Resolve every reference through the Reader handle.
    ///
    /// # Errors
    ///
    /// Returns the first [`SecretResolutionError`]: the Reader lacks
    /// permission, the record is gone, or the store is unreachable.
    pub async fn resolve(
        &self,
        reader: &SecretReader,
    ) -> Result<ResolvedEnvironment, SecretResolutionError> {
        let mut values = BTreeMap::new();
        for r in &self.references {
            match reader.get(&r.secret).await {
                Ok(value) => {
                    debug!(env = %r.env_var, secret = %r.secret, "secret resolved");
                    values.insert(r.env_var.clone(), value);
                }
                Err(reason) => {
                    warn!(env = %r.env_var, secret = %r.secret, error = %reason, "secret resolution failed");
                    return Err(SecretResolutionError {
                        env_var: r.env_var.clone(),
                        secret: r.secret.to_string(),
                        reason,
                    });
                }
            }
        }
        Ok(ResolvedEnvironment { values })
    }
}

/// Resolved runtime values, keyed by environment variable. Redacted in `Debug`.
#[derive(Clone, Default)]
pub struct ResolvedEnvironment {
    values: BTreeMap<String, SecretValue>,
}

impl ResolvedEnvironment {
    #[must_use]
    pub fn get(&self, env_var: &str) -> Option<&SecretValue> {
        self.values.get(env_var)
    }

    /// `(name, value)` pairs for handing to a child process.
    pub fn exposed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.expose()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ResolvedEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use keyseed_storage::MemoryBackend;

    use super::*;
    use crate::access::{ReaderCredential, StoreScope};
    use crate::barrier::Barrier;
    use crate::crypto::EncryptionKey;
    use crate::error::StoreError;
    use crate::generator::OsRngGenerator;
    use crate::store::SecretWriter;
    use crate::vault::{IssuedCredentials, VaultStore};

    fn n(s: &str) -> SecretName {
        SecretName::parse(s).unwrap()
    }

    async fn store() -> (Arc<VaultStore>, IssuedCredentials) {
        let barrier = Barrier::new(Arc::new(MemoryBackend::new()), EncryptionKey::generate());
        let vault = Arc::new(VaultStore::new(Arc::new(barrier), StoreScope::new("kv")));
        let creds = vault.initialize(&OsRngGenerator).await.unwrap();
        (vault, creds)
    }

    fn standard_binding() -> WorkloadSecretBinding {
        WorkloadSecretBinding::new(vec![
            SecretReference::new("ADMIN_TOKEN", n("admin-token")).unwrap(),
            SecretReference::new("DATABASE_PASSWORD", n("db-password")).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn env_names_are_validated() {
        for ok in ["ADMIN_TOKEN", "_x", "a1"] {
            assert!(SecretReference::new(ok, n("a")).is_ok(), "{ok}");
        }
        for bad in ["", "1ABC", "db-password", "A B", "A=B"] {
            assert!(
                matches!(
                    SecretReference::new(bad, n("a")),
                    Err(BindingError::InvalidEnvVar { .. })
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn env_name_must_differ_from_store_key() {
        for (env, key) in [("ADMINTOKEN", "ADMINTOKEN"), ("admintoken", "ADMINTOKEN")] {
            assert_eq!(
                SecretReference::new(env, n(key)).unwrap_err(),
                BindingError::EnvVarIsStoreKey { name: env.into() }
            );
        }
        assert!(SecretReference::new("ADMIN_TOKEN", n("ADMINTOKEN")).is_ok());
    }

    #[test]
    fn duplicate_env_vars_are_rejected() {
        let err = WorkloadSecretBinding::new(vec![
            SecretReference::new("X", n("a")).unwrap(),
            SecretReference::new("X", n("b")).unwrap(),
        ])
        .unwrap_err();
        assert_eq!(err, BindingError::DuplicateEnvVar { name: "X".into() });
    }

    #[tokio::test]
    async fn resolves_with_reader() {
        let (vault, creds) = store().await;
        let writer = SecretWriter::new(vault.clone(), creds.writer.clone());
        writer.set(&n("admin-token"), &SecretValue::new("tok")).await.unwrap();
        writer
            .set(&n("db-password"), &SecretValue::new("S3cur3Pass"))
            .await
            .unwrap();

        let reader = SecretReader::new(vault, creds.reader);
        let env = standard_binding().resolve(&reader).await.unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("DATABASE_PASSWORD").unwrap().expose(), "S3cur3Pass");
        assert!(env.get("db-password").is_none());

        let shown = format!("{env:?}");
        assert!(shown.contains("ADMIN_TOKEN"));
        assert!(!shown.contains("S3cur3Pass"));
    }

    #[tokio::test]
    async fn refresh_sees_rotated_value() {
        let (vault, creds) = store().await;
        let writer = SecretWriter::new(vault.clone(), creds.writer.clone());
        let reader = SecretReader::new(vault, creds.reader);
        let binding = WorkloadSecretBinding::new(vec![
            SecretReference::new("DATABASE_PASSWORD", n("db-password")).unwrap(),
        ])
        .unwrap();

        writer.set(&n("db-password"), &SecretValue::new("v1")).await.unwrap();
        assert_eq!(
            binding.resolve(&reader).await.unwrap().get("DATABASE_PASSWORD").unwrap().expose(),
            "v1"
        );
        writer.set(&n("db-password"), &SecretValue::new("v2")).await.unwrap();
        assert_eq!(
            binding.resolve(&reader).await.unwrap().get("DATABASE_PASSWORD").unwrap().expose(),
            "v2"
        );
    }

    #[tokio::test]
    async fn absent_record_fails_resolution() {
        let (vault, creds) = store().await;
        let reader = SecretReader::new(vault, creds.reader);
        let err = standard_binding().resolve(&reader).await.unwrap_err();
        assert_eq!(err.env_var, "ADMIN_TOKEN");
        assert_eq!(err.secret, "admin-token");
        assert!(matches!(err.reason, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn writer_identity_cannot_resolve() {
        let (vault, creds) = store().await;
        let writer = SecretWriter::new(vault.clone(), creds.writer.clone());
        writer.set(&n("admin-token"), &SecretValue::new("tok")).await.unwrap();

        let wrong = SecretReader::new(
            vault,
            ReaderCredential::new(creds.writer.credential().clone()),
        );
        let err = standard_binding().resolve(&wrong).await.unwrap_err();
        assert!(matches!(err.reason, StoreError::PermissionDenied { .. }));
    }
}
