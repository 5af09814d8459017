//! Idempotent secret bootstrap.
//!
//! [`ProvisioningJob`] makes sure every declared secret exists in the store.
//! For each descriptor, in order:
//!
//! 1. `exists(name)` through the Writer handle, immediately before deciding.
//! 2. Present: skip. The value is never read or logged.
//! 3. Absent: take the supplied value or generate one, then `set` it.
//!
//! The job holds no state between runs, so re-running it is always safe and
//! leaves existing secrets untouched. The first failing descriptor aborts the
//! run; secrets created before it stay in place.
//!
//! Two overlapping runs can both observe absence and both `set`. The store's
//! last write wins. Callers are expected to run one job per deployment.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use tracing::{error, info};

use crate::error::{GeneratorError, ProvisionError, StoreError};
use crate::generator::SecretGenerator;
use crate::secret::{SecretName, SecretValue};
use crate::store::SecretWriter;

/// How a missing secret gets its value.
#[derive(Debug, Clone)]
pub enum SecretPolicy {
    /// Synthesize a fresh token.
    GenerateIfAbsent,
    /// Use the value delivered through the secure parameter channel. `None`
    /// or an empty value means the channel had nothing.
    SuppliedValue(Option<SecretValue>),
}

impl SecretPolicy {
    /// Policy name as used in manifests and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateIfAbsent => "generate-if-absent",
            Self::SuppliedValue(_) => "supplied-value",
        }
    }
}

/// One secret the deployment requires.
#[derive(Debug, Clone)]
pub struct SecretDescriptor {
    pub name: SecretName,
    pub policy: SecretPolicy,
}

impl SecretDescriptor {
    #[must_use]
    pub fn new(name: SecretName, policy: SecretPolicy) -> Self {
        Self { name, policy }
    }

    #[must_use]
    pub fn generate_if_absent(name: SecretName) -> Self {
        Self::new(name, SecretPolicy::GenerateIfAbsent)
    }

    #[must_use]
    pub fn supplied(name: SecretName, value: Option<SecretValue>) -> Self {
        Self::new(name, SecretPolicy::SuppliedValue(value))
    }
}

/// Terminal state of one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExisted,
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::AlreadyExisted => f.write_str("already_existed"),
        }
    }
}

/// What a successful run did, in processing order.
#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    entries: Vec<(SecretName, ProvisionOutcome)>,
}

impl ProvisionReport {
    pub fn iter(&self) -> impl Iterator<Item = (&SecretName, ProvisionOutcome)> {
        self.entries.iter().map(|(n, o)| (n, *o))
    }

    /// Outcome for `name`, if it was part of the run.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<ProvisionOutcome> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, o)| *o)
    }

    /// Number of secrets this run created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, o)| *o == ProvisionOutcome::Created)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The one-shot bootstrap over a fixed descriptor list.
#[derive(Debug, Clone)]
pub struct ProvisioningJob {
    descriptors: Vec<SecretDescriptor>,
}

impl ProvisioningJob {
    /// Build a job.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::DuplicateDescriptor`] if two descriptors
    /// share a name.
    pub fn new(descriptors: Vec<SecretDescriptor>) -> Result<Self, ProvisionError> {
        let mut seen = HashSet::new();
        for d in &descriptors {
            if !seen.insert(d.name.as_str()) {
                return Err(ProvisionError::DuplicateDescriptor {
                    name: d.name.to_string(),
                });
            }
        }
        Ok(Self { descriptors })
    }

    #[must_use]
    pub fn descriptors(&self) -> &[SecretDescriptor] {
        &self.descriptors
    }

    /// Run the job to completion or to the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first descriptor's [`ProvisionError`]. Later descriptors
    /// are not touched.
    pub async fn run(
        &self,
        writer: &SecretWriter,
        generator: &dyn SecretGenerator,
    ) -> Result<ProvisionReport, ProvisionError> {
        let mut report = ProvisionReport::default();
        for descriptor in &self.descriptors {
            match provision_one(descriptor, writer, generator).await {
                Ok(outcome) => {
                    info!(secret = %descriptor.name, %outcome, "secret provisioned");
                    report.entries.push((descriptor.name.clone(), outcome));
                }
                Err(e) => {
                    error!(
                        secret = %descriptor.name,
                        kind = e.kind(),
                        error = %e,
                        "provisioning aborted"
                    );
                    return Err(e);
                }
            }
        }
        info!(
            total = report.len(),
            created = report.created(),
            "provisioning complete"
        );
        Ok(report)
    }

    /// [`run`](Self::run) bounded by `limit`. Exceeding it is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::TimedOut`] past the bound, otherwise as
    /// [`run`](Self::run).
    pub async fn run_with_timeout(
        &self,
        writer: &SecretWriter,
        generator: &dyn SecretGenerator,
        limit: Duration,
    ) -> Result<ProvisionReport, ProvisionError> {
        tokio::time::timeout(limit, self.run(writer, generator))
            .await
            .map_err(|_| {
                error!(secs = limit.as_secs(), "provisioning timed out");
                ProvisionError::TimedOut {
                    secs: limit.as_secs(),
                }
            })?
    }
}

async fn provision_one(
    descriptor: &SecretDescriptor,
    writer: &SecretWriter,
    generator: &dyn SecretGenerator,
) -> Result<ProvisionOutcome, ProvisionError> {
    let name = &descriptor.name;

    if writer
        .exists(name)
        .await
        .map_err(|e| store_failure(name, e))?
    {
        return Ok(ProvisionOutcome::AlreadyExisted);
    }

    let value = match &descriptor.policy {
        SecretPolicy::GenerateIfAbsent => generator.generate().map_err(|e| match e {
            GeneratorError::EntropySourceUnavailable { reason } => {
                ProvisionError::EntropySourceUnavailable {
                    name: name.to_string(),
                    reason,
                }
            }
        })?,
        SecretPolicy::SuppliedValue(Some(v)) if !v.is_empty() => v.clone(),
        SecretPolicy::SuppliedValue(_) => {
            return Err(ProvisionError::MissingSuppliedValue {
                name: name.to_string(),
            });
        }
    };

    writer
        .set(name, &value)
        .await
        .map_err(|e| store_failure(name, e))?;
    Ok(ProvisionOutcome::Created)
}

fn store_failure(name: &SecretName, err: StoreError) -> ProvisionError {
    match err {
        StoreError::PermissionDenied { operation, .. } => ProvisionError::StorePermissionDenied {
            name: name.to_string(),
            operation,
        },
        source => ProvisionError::Store {
            name: name.to_string(),
            source,
        },
    }
}
