//! Core library for keyseed.
//!
//! Idempotent secret bootstrap with role-separated access. A
//! [`ProvisioningJob`](provision::ProvisioningJob) makes sure every required
//! secret exists, generating or accepting a value only when it is absent, and
//! writes through a Writer identity that can never read. Workloads resolve
//! values at start through a Reader identity that can never write.
//!
//! The store contract lives in [`store`]; [`vault::VaultStore`] implements it
//! on top of the encrypting [`barrier`] and any `keyseed-storage` backend.

pub mod access;
pub mod barrier;
pub mod binding;
pub mod crypto;
pub mod error;
pub mod generator;
pub mod manifest;
pub mod provision;
pub mod secret;
pub mod store;
pub mod vault;
