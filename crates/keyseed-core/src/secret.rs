//! Secret names and values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::InvalidSecretName;

/// Longest accepted logical name.
pub const MAX_SECRET_NAME_LEN: usize = 127;

/// Logical key of a secret inside the store, e.g. `admin-token`.
///
/// 1 to 127 ASCII alphanumerics or `-`. Managed secret stores use the same
/// alphabet, and it keeps names safe to use as URL path segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretName(String);

impl SecretName {
    /// Validate and wrap `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSecretName`] if `raw` is empty, too long, or contains
    /// anything other than ASCII alphanumerics and `-`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidSecretName> {
        let raw = raw.into();
        let reason = if raw.is_empty() {
            Some("must not be empty")
        } else if raw.len() > MAX_SECRET_NAME_LEN {
            Some("longer than 127 characters")
        } else if !raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            Some("only ASCII letters, digits and '-' are allowed")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidSecretName { name: raw, reason }),
            None => Ok(Self(raw)),
        }
    }

    /// Built-in names only; skips validation.
    pub(crate) fn from_static(raw: &'static str) -> Self {
        debug_assert!(Self::parse(raw).is_ok());
        Self(raw.to_owned())
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SecretName {
    type Err = InvalidSecretName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SecretName {
    type Error = InvalidSecretName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SecretName> for String {
    fn from(name: SecretName) -> Self {
        name.0
    }
}

/// An opaque sensitive string.
///
/// Zeroized on drop. `Debug` prints `[REDACTED]` and there is no `Display`;
/// reading the value takes an explicit [`expose`](Self::expose).
/// Equality is constant-time.
#[derive(Clone, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wrap a sensitive string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the plaintext. Callers must not log or persist it.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the value is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}

impl PartialEq for SecretValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for SecretValue {}
