//! Deployment manifest: which secrets a deployment needs and where they go.
//!
//! ```json
//! {
//!   "secrets": [
//!     { "name": "admin-token", "policy": "generate-if-absent", "env": "ADMIN_TOKEN" },
//!     { "name": "db-password", "policy": "supplied-value",
//!       "supplied_from": "KEYSEED_DB_PASSWORD", "env": "DATABASE_PASSWORD" }
//!   ]
//! }
//! ```
//!
//! A manifest never holds values. `supplied_from` names the environment
//! variable that carries a supplied value into the provisioning process; it
//! is read at run time through the lookup passed to
//! [`DeploymentManifest::descriptors`].

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::binding::{SecretReference, WorkloadSecretBinding};
use crate::error::ManifestError;
use crate::provision::{SecretDescriptor, SecretPolicy};
use crate::secret::{SecretName, SecretValue};

/// Name of the generated administrative credential.
pub const ADMIN_TOKEN: &str = "admin-token";

/// Name of the operator-supplied database password.
pub const DB_PASSWORD: &str = "db-password";

/// Default channel for the database password.
pub const DB_PASSWORD_CHANNEL: &str = "KEYSEED_DB_PASSWORD";

/// Policy as written in a manifest. Carries no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestPolicy {
    GenerateIfAbsent,
    SuppliedValue,
}

/// One validated manifest entry.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestSecret {
    pub name: SecretName,
    pub policy: ManifestPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplied_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    secrets: Vec<RawSecret>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSecret {
    name: String,
    policy: ManifestPolicy,
    #[serde(default)]
    supplied_from: Option<String>,
    #[serde(default)]
    env: Option<String>,
}

/// A validated list of required secrets.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentManifest {
    secrets: Vec<ManifestSecret>,
}

impl DeploymentManifest {
    /// The built-in manifest: a generated admin token and an
    /// operator-supplied database password.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            secrets: vec![
                ManifestSecret {
                    name: SecretName::from_static(ADMIN_TOKEN),
                    policy: ManifestPolicy::GenerateIfAbsent,
                    supplied_from: None,
                    env: Some("ADMIN_TOKEN".to_owned()),
                },
                ManifestSecret {
                    name: SecretName::from_static(DB_PASSWORD),
                    policy: ManifestPolicy::SuppliedValue,
                    supplied_from: Some(DB_PASSWORD_CHANNEL.to_owned()),
                    env: Some("DATABASE_PASSWORD".to_owned()),
                },
            ],
        }
    }

    /// Parse and validate a JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns a [`ManifestError`] for malformed JSON, an empty list, an
    /// invalid or duplicated name, a supplied-value entry without
    /// `supplied_from`, or an invalid environment binding.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(json).map_err(|e| ManifestError::Parse {
            reason: e.to_string(),
        })?;
        if raw.secrets.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut seen = HashSet::new();
        let mut secrets = Vec::with_capacity(raw.secrets.len());
        for entry in raw.secrets {
            let name = SecretName::parse(entry.name)?;
            if !seen.insert(name.clone()) {
                return Err(ManifestError::DuplicateSecret {
                    name: name.to_string(),
                });
            }
            let supplied_from = entry.supplied_from.filter(|s| !s.is_empty());
            if entry.policy == ManifestPolicy::SuppliedValue && supplied_from.is_none() {
                return Err(ManifestError::MissingSuppliedFrom {
                    name: name.to_string(),
                });
            }
            secrets.push(ManifestSecret {
                name,
                policy: entry.policy,
                supplied_from,
                env: entry.env,
            });
        }

        let manifest = Self { secrets };
        manifest.workload_binding()?;
        Ok(manifest)
    }

    /// Read and validate a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the file cannot be read, otherwise as
    /// [`from_json`](Self::from_json).
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let json = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn secrets(&self) -> &[ManifestSecret] {
        &self.secrets
    }

    /// Names of the channels that carry supplied values. A workload must
    /// never inherit them.
    pub fn supplied_channels(&self) -> impl Iterator<Item = &str> {
        self.secrets
            .iter()
            .filter_map(|s| s.supplied_from.as_deref())
    }

    /// Provisioning descriptors, pulling supplied values through `channel`.
    ///
    /// `channel` receives the `supplied_from` name and returns the value, if
    /// the secure channel carries one.
    pub fn descriptors<F>(&self, channel: F) -> Vec<SecretDescriptor>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.secrets
            .iter()
            .map(|s| match s.policy {
                ManifestPolicy::GenerateIfAbsent => {
                    SecretDescriptor::generate_if_absent(s.name.clone())
                }
                ManifestPolicy::SuppliedValue => {
                    let value = s
                        .supplied_from
                        .as_deref()
                        .and_then(&channel)
                        .map(SecretValue::new);
                    SecretDescriptor::new(s.name.clone(), SecretPolicy::SuppliedValue(value))
                }
            })
            .collect()
    }

    /// The workload binding for every entry with an `env` target.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Binding`] for an invalid or duplicated
    /// environment variable name.
    pub fn workload_binding(&self) -> Result<WorkloadSecretBinding, ManifestError> {
        let references = self
            .secrets
            .iter()
            .filter_map(|s| {
                s.env
                    .as_ref()
                    .map(|env| SecretReference::new(env.clone(), s.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WorkloadSecretBinding::new(references)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::BindingError;

    #[test]
    fn standard_manifest_keeps_the_asymmetry() {
        let m = DeploymentManifest::standard();
        let admin = &m.secrets()[0];
        let db = &m.secrets()[1];
        assert_eq!(admin.name.as_str(), ADMIN_TOKEN);
        assert_eq!(admin.policy, ManifestPolicy::GenerateIfAbsent);
        assert_eq!(db.name.as_str(), DB_PASSWORD);
        assert_eq!(db.policy, ManifestPolicy::SuppliedValue);
        assert_eq!(db.supplied_from.as_deref(), Some(DB_PASSWORD_CHANNEL));
    }

    #[test]
    fn standard_manifest_roundtrips_through_json() {
        let json = serde_json::to_string(&DeploymentManifest::standard()).unwrap();
        let parsed = DeploymentManifest::from_json(&json).unwrap();
        assert_eq!(parsed.secrets().len(), 2);
    }

    #[test]
    fn descriptors_pull_supplied_values_from_channel() {
        let m = DeploymentManifest::standard();
        let descriptors = m.descriptors(|key| {
            (key == DB_PASSWORD_CHANNEL).then(|| "S3cur3Pass".to_owned())
        });
        assert!(matches!(descriptors[0].policy, SecretPolicy::GenerateIfAbsent));
        assert!(matches!(
            &descriptors[1].policy,
            SecretPolicy::SuppliedValue(Some(v)) if v.expose() == "S3cur3Pass"
        ));

        let empty = m.descriptors(|_| None);
        assert!(matches!(empty[1].policy, SecretPolicy::SuppliedValue(None)));
    }

    #[test]
    fn workload_binding_uses_semantic_env_names() {
        let binding = DeploymentManifest::standard().workload_binding().unwrap();
        let pairs: Vec<_> = binding
            .references()
            .iter()
            .map(|r| (r.env_var().to_owned(), r.secret().to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("ADMIN_TOKEN".to_owned(), "admin-token".to_owned()),
                ("DATABASE_PASSWORD".to_owned(), "db-password".to_owned()),
            ]
        );
    }

    #[test]
    fn rejects_bad_manifests() {
        assert!(matches!(
            DeploymentManifest::from_json("{\"secrets\":[]}"),
            Err(ManifestError::Empty)
        ));
        assert!(matches!(
            DeploymentManifest::from_json("not json"),
            Err(ManifestError::Parse { .. })
        ));
        assert!(matches!(
            DeploymentManifest::from_json(
                r#"{"secrets":[{"name":"db-password","policy":"supplied-value"}]}"#
            ),
            Err(ManifestError::MissingSuppliedFrom { .. })
        ));
        assert!(matches!(
            DeploymentManifest::from_json(
                r#"{"secrets":[{"name":"bad name","policy":"generate-if-absent"}]}"#
            ),
            Err(ManifestError::InvalidName(_))
        ));
        assert!(matches!(
            DeploymentManifest::from_json(
                r#"{"secrets":[
                    {"name":"a","policy":"generate-if-absent"},
                    {"name":"a","policy":"generate-if-absent"}]}"#
            ),
            Err(ManifestError::DuplicateSecret { .. })
        ));
        assert!(matches!(
            DeploymentManifest::from_json(
                r#"{"secrets":[{"name":"a","policy":"generate-if-absent","env":"a-b"}]}"#
            ),
            Err(ManifestError::Binding(BindingError::InvalidEnvVar { .. }))
        ));
        assert!(matches!(
            DeploymentManifest::from_json(
                r#"{"secrets":[{"name":"ADMINTOKEN","policy":"generate-if-absent","env":"ADMINTOKEN"}]}"#
            ),
            Err(ManifestError::Binding(BindingError::EnvVarIsStoreKey { .. }))
        ));
    }

    #[test]
    fn supplied_channels_lists_only_supplied_value_sources() {
        let manifest = DeploymentManifest::standard();
        let channels: Vec<&str> = manifest.supplied_channels().collect();
        assert_eq!(channels, [DB_PASSWORD_CHANNEL]);
    }

    #[test]
    fn values_are_not_accepted_in_manifest() {
        let err = DeploymentManifest::from_json(
            r#"{"secrets":[{"name":"a","policy":"generate-if-absent","value":"x"}]}"#,
        );
        assert!(matches!(err, Err(ManifestError::Parse { .. })));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DeploymentManifest::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            r#"{"secrets":[{"name":"admin-token","policy":"generate-if-absent","env":"ADMIN_TOKEN"}]}"#,
        )
        .unwrap();
        let m = DeploymentManifest::load(&path).unwrap();
        assert_eq!(m.secrets().len(), 1);
    }
}
