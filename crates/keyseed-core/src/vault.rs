//! Local RBAC-enforcing secret store.
//!
//! [`VaultStore`] is the concrete [`SecretStore`] served by `keyseed-server`.
//! It keeps two kinds of entries behind the barrier:
//!
//! - `sys/init`: the deployment's two principals, each with its role binding
//!   and the SHA-256 hash of its credential secret. Written once, atomically.
//! - `secrets/<name>`: one [`SecretRecord`] per logical secret.
//!
//! Every call authenticates the bearer credential against `sys/init`, then
//! checks the principal's binding for the permission the operation needs:
//!
//! | operation | permission |
//! |---|---|
//! | `exists` | `list` |
//! | `get` | `read` |
//! | `set` on an absent name | `create` |
//! | `set` on a present name | `update` |

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::access::{
    Credential, Permission, Principal, PrincipalId, ReaderCredential, Role, RoleBinding,
    StoreScope, WriterCredential,
};
use crate::barrier::Barrier;
use crate::error::StoreError;
use crate::generator::SecretGenerator;
use crate::secret::{SecretName, SecretValue};
use crate::store::{SecretStore, StoreOperation};

/// Storage key of the initialisation record.
const INIT_KEY: &str = "sys/init";

/// Storage prefix for secret records.
const SECRET_PREFIX: &str = "secrets/";

/// A persisted secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    pub name: SecretName,
    pub value: SecretValue,
    /// Starts at 1, incremented on every overwrite.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PrincipalRecord {
    binding: RoleBinding,
    /// Hex SHA-256 of the credential's token part.
    secret_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InitRecord {
    scope: StoreScope,
    initialized_at: DateTime<Utc>,
    principals: Vec<PrincipalRecord>,
}

/// Credentials handed out by [`VaultStore::initialize`]. Shown once.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub writer: WriterCredential,
    pub reader: ReaderCredential,
}

/// Public view of the store. Contains no hashes and no values.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub initialized: bool,
    pub scope: StoreScope,
    pub initialized_at: Option<DateTime<Utc>>,
    pub bindings: Vec<RoleBinding>,
    pub secrets: Vec<String>,
}

/// Secret store enforcing the Writer/Reader role bindings.
pub struct VaultStore {
    barrier: Arc<Barrier>,
    scope: StoreScope,
    init_lock: Mutex<()>,
    init_cache: RwLock<Option<Arc<InitRecord>>>,
}

impl VaultStore {
    #[must_use]
    pub fn new(barrier: Arc<Barrier>, scope: StoreScope) -> Self {
        Self {
            barrier,
            scope,
            init_lock: Mutex::new(()),
            init_cache: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn scope(&self) -> &StoreScope {
        &self.scope
    }

    /// Whether principals have been created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Barrier`] if storage fails.
    pub async fn is_initialized(&self) -> Result<bool, StoreError> {
        Ok(self.barrier.exists(INIT_KEY).await?)
    }

    /// Decrypt the init record, if any, to detect a wrong master key early.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Barrier`] if the record does not decrypt.
    pub async fn verify_key(&self) -> Result<(), StoreError> {
        self.barrier.get(INIT_KEY).await?;
        Ok(())
    }

    /// Create the Writer and Reader principals for this deployment.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyInitialized`] on every call after the first.
    /// - [`StoreError::Generator`] if credential secrets cannot be generated.
    /// - [`StoreError::Barrier`] if storage fails.
    pub async fn initialize(
        &self,
        generator: &dyn SecretGenerator,
    ) -> Result<IssuedCredentials, StoreError> {
        let _guard = self.init_lock.lock().await;

        if self.barrier.exists(INIT_KEY).await? {
            return Err(StoreError::AlreadyInitialized);
        }

        let now = Utc::now();
        let writer = Credential::new(PrincipalId::new(), generator.generate()?);
        let reader = Credential::new(PrincipalId::new(), generator.generate()?);

        let principals = [(&writer, Role::Writer), (&reader, Role::Reader)]
            .into_iter()
            .map(|(cred, role)| PrincipalRecord {
                binding: RoleBinding::for_principal(
                    Principal {
                        id: cred.principal(),
                        role,
                    },
                    self.scope.clone(),
                ),
                secret_hash: hash_secret(cred.secret()),
                created_at: now,
            })
            .collect();

        let record = InitRecord {
            scope: self.scope.clone(),
            initialized_at: now,
            principals,
        };
        self.barrier.put(INIT_KEY, &to_json(&record)?).await?;
        *self.init_cache.write().await = Some(Arc::new(record));

        info!(
            scope = %self.scope,
            writer = %writer.principal(),
            reader = %reader.principal(),
            "secret store initialized"
        );

        Ok(IssuedCredentials {
            writer: WriterCredential::new(writer),
            reader: ReaderCredential::new(reader),
        })
    }

    /// Resolve a credential to its validated role binding.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotInitialized`] if no principals exist yet.
    /// - [`StoreError::Unauthenticated`] for an unknown principal or a wrong
    ///   secret.
    /// - [`StoreError::InvalidBinding`] if the stored binding was tampered with.
    pub async fn authenticate(&self, credential: &Credential) -> Result<RoleBinding, StoreError> {
        let init = self.load_init().await?;
        let Some(record) = init
            .principals
            .iter()
            .find(|p| p.binding.principal.id == credential.principal())
        else {
            warn!(principal = %credential.principal(), "unknown principal");
            return Err(StoreError::Unauthenticated);
        };

        let presented = hash_secret(credential.secret());
        if !bool::from(presented.as_bytes().ct_eq(record.secret_hash.as_bytes())) {
            warn!(principal = %credential.principal(), "credential secret mismatch");
            return Err(StoreError::Unauthenticated);
        }

        Ok(record.binding.clone())
    }

    /// Current state for operators.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Barrier`] if storage fails.
    pub async fn status(&self) -> Result<StoreStatus, StoreError> {
        let init = match self.load_init().await {
            Ok(init) => Some(init),
            Err(StoreError::NotInitialized) => None,
            Err(e) => return Err(e),
        };

        let secrets = self
            .barrier
            .list(SECRET_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(SECRET_PREFIX).map(str::to_owned))
            .collect();

        Ok(StoreStatus {
            initialized: init.is_some(),
            scope: self.scope.clone(),
            initialized_at: init.as_ref().map(|i| i.initialized_at),
            bindings: init
                .map(|i| i.principals.iter().map(|p| p.binding.clone()).collect())
                .unwrap_or_default(),
            secrets,
        })
    }

    async fn load_init(&self) -> Result<Arc<InitRecord>, StoreError> {
        if let Some(cached) = self.init_cache.read().await.as_ref() {
            return Ok(Arc::clone(cached));
        }

        let bytes = self
            .barrier
            .get(INIT_KEY)
            .await?
            .ok_or(StoreError::NotInitialized)?;
        let record: InitRecord = serde_json::from_slice(&bytes).map_err(|e| StoreError::Internal {
            reason: format!("init record is corrupt: {e}"),
        })?;
        for principal in &record.principals {
            principal.binding.validate()?;
        }

        let record = Arc::new(record);
        *self.init_cache.write().await = Some(Arc::clone(&record));
        Ok(record)
    }

    async fn authorize(
        &self,
        credential: &Credential,
        name: &SecretName,
        permission: Permission,
        operation: StoreOperation,
    ) -> Result<(), StoreError> {
        let binding = self.authenticate(credential).await?;
        if binding.allows(&self.scope, permission) {
            return Ok(());
        }
        warn!(
            principal = %binding.principal.id,
            role = %binding.principal.role,
            secret = %name,
            %operation,
            "permission denied"
        );
        Err(StoreError::PermissionDenied {
            operation,
            name: name.to_string(),
        })
    }

    async fn load_record(&self, name: &SecretName) -> Result<Option<SecretRecord>, StoreError> {
        let Some(bytes) = self.barrier.get(&secret_key(name)).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Internal {
                reason: format!("record for '{name}' is corrupt: {e}"),
            })
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    async fn exists(&self, credential: &Credential, name: &SecretName) -> Result<bool, StoreError> {
        self.authorize(credential, name, Permission::List, StoreOperation::Exists)
            .await?;
        Ok(self.barrier.exists(&secret_key(name)).await?)
    }

    async fn set(
        &self,
        credential: &Credential,
        name: &SecretName,
        value: &SecretValue,
    ) -> Result<(), StoreError> {
        let binding = self.authenticate(credential).await?;
        let existing = self.load_record(name).await?;
        let permission = if existing.is_some() {
            Permission::Update
        } else {
            Permission::Create
        };
        if !binding.allows(&self.scope, permission) {
            warn!(
                principal = %binding.principal.id,
                role = %binding.principal.role,
                secret = %name,
                %permission,
                "permission denied"
            );
            return Err(StoreError::PermissionDenied {
                operation: StoreOperation::Set,
                name: name.to_string(),
            });
        }

        let now = Utc::now();
        let record = match existing {
            Some(prev) => SecretRecord {
                name: name.clone(),
                value: value.clone(),
                version: prev.version.saturating_add(1),
                created_at: prev.created_at,
                updated_at: now,
            },
            None => SecretRecord {
                name: name.clone(),
                value: value.clone(),
                version: 1,
                created_at: now,
                updated_at: now,
            },
        };
        self.barrier
            .put(&secret_key(name), &to_json(&record)?)
            .await?;

        debug!(secret = %name, version = record.version, "secret written");
        Ok(())
    }

    async fn get(
        &self,
        credential: &Credential,
        name: &SecretName,
    ) -> Result<SecretValue, StoreError> {
        self.authorize(credential, name, Permission::Read, StoreOperation::Get)
            .await?;
        self.load_record(name)
            .await?
            .map(|record| record.value)
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })
    }
}

impl fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultStore")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

fn secret_key(name: &SecretName) -> String {
    format!("{SECRET_PREFIX}{name}")
}

fn hash_secret(secret: &SecretValue) -> String {
    hex::encode(Sha256::digest(secret.expose().as_bytes()))
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Internal {
        reason: format!("serialization failed: {e}"),
    })
}
