//! Principals, role bindings, and credentials.
//!
//! Every deployment gets exactly two non-human principals:
//!
//! - **Writer**: `{list, create, update}`. May check whether a secret exists
//!   and may write it, but can never read a value back.
//! - **Reader**: `{read}` and nothing else. A compromised workload holding
//!   only this identity cannot mutate secrets.
//!
//! The two roles have disjoint permission sets. [`RoleBinding::validate`]
//! re-checks that whenever a binding is loaded from storage.
//!
//! Credentials are bearer strings `<principal-uuid>.<token>`. Only the
//! SHA-256 hash of the token part is ever persisted.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{InvalidRoleBinding, StoreError};
use crate::secret::SecretValue;

/// The role a principal plays against the secret store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Creates and updates secrets during provisioning.
    Writer,
    /// Resolves secrets for the running workload.
    Reader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Writer => f.write_str("writer"),
            Self::Reader => f.write_str("reader"),
        }
    }
}

/// A single store permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Observe whether a name is present without reading its value.
    List,
    /// Write a name that does not exist yet.
    Create,
    /// Overwrite a name that already exists.
    Update,
    /// Read a value.
    Read,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Read => "read",
        };
        f.write_str(s)
    }
}

/// An ordered set of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// The canonical permission set for `role`.
    #[must_use]
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Writer => [Permission::List, Permission::Create, Permission::Update]
                .into_iter()
                .collect(),
            Role::Reader => std::iter::once(Permission::Read).collect(),
        }
    }

    /// Whether `permission` is granted.
    #[must_use]
    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    /// Iterate in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// Number of permissions granted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        f.write_str("}")
    }
}

/// Identifier of a principal. Fresh per deployment, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    /// A new random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A non-human identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub role: Role,
}

/// Name of the secret store instance a binding applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreScope(String);

impl StoreScope {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grants one principal a permission set on one store scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub principal: Principal,
    pub scope: StoreScope,
    pub permissions: PermissionSet,
}

impl RoleBinding {
    /// The canonical binding for `principal` on `scope`.
    #[must_use]
    pub fn for_principal(principal: Principal, scope: StoreScope) -> Self {
        Self {
            permissions: PermissionSet::for_role(principal.role),
            principal,
            scope,
        }
    }

    /// Check the writer/reader invariant.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRoleBinding`] if a Reader holds anything but
    /// `{read}`, or a Writer lacks `create`/`update` or holds `read`.
    pub fn validate(&self) -> Result<(), InvalidRoleBinding> {
        let fail = |reason| InvalidRoleBinding {
            principal: self.principal.id.to_string(),
            reason,
        };

        match self.principal.role {
            Role::Reader => {
                if self.permissions != PermissionSet::for_role(Role::Reader) {
                    return Err(fail("reader must hold exactly {read}"));
                }
            }
            Role::Writer => {
                if !self.permissions.contains(Permission::Create)
                    || !self.permissions.contains(Permission::Update)
                {
                    return Err(fail("writer must hold create and update"));
                }
                if self.permissions.contains(Permission::Read) {
                    return Err(fail("writer must not hold read"));
                }
            }
        }
        Ok(())
    }

    /// Whether this binding grants `permission` on `scope`.
    #[must_use]
    pub fn allows(&self, scope: &StoreScope, permission: Permission) -> bool {
        &self.scope == scope && self.permissions.contains(permission)
    }
}

/// A principal's bearer credential.
#[derive(Clone)]
pub struct Credential {
    principal: PrincipalId,
    secret: SecretValue,
}

impl Credential {
    #[must_use]
    pub fn new(principal: PrincipalId, secret: SecretValue) -> Self {
        Self { principal, secret }
    }

    /// Parse a bearer string of the form `<principal-uuid>.<token>`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MalformedCredential`] if there is no `.`, the
    /// id is not a UUID, or the token part is empty.
    pub fn parse(bearer: &str) -> Result<Self, StoreError> {
        let (id, secret) = bearer
            .trim()
            .split_once('.')
            .ok_or(StoreError::MalformedCredential)?;
        if secret.is_empty() {
            return Err(StoreError::MalformedCredential);
        }
        let principal = id
            .parse::<PrincipalId>()
            .map_err(|_| StoreError::MalformedCredential)?;
        Ok(Self::new(principal, SecretValue::new(secret)))
    }

    #[must_use]
    pub fn principal(&self) -> PrincipalId {
        self.principal
    }

    /// The token part. Only used to hash and compare.
    #[must_use]
    pub fn secret(&self) -> &SecretValue {
        &self.secret
    }

    /// The bearer form, for `Authorization` headers and credential files.
    #[must_use]
    pub fn to_bearer(&self) -> SecretValue {
        SecretValue::new(format!("{}.{}", self.principal, self.secret.expose()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("principal", &self.principal)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A credential issued to the Writer principal.
#[derive(Debug, Clone)]
pub struct WriterCredential(Credential);

impl WriterCredential {
    #[must_use]
    pub fn new(credential: Credential) -> Self {
        Self(credential)
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.0
    }
}

/// A credential issued to the Reader principal.
#[derive(Debug, Clone)]
pub struct ReaderCredential(Credential);

impl ReaderCredential {
    #[must_use]
    pub fn new(credential: Credential) -> Self {
        Self(credential)
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.0
    }
}
