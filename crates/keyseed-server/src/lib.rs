//! keyseed HTTP server.
//!
//! Serves a [`VaultStore`](keyseed_core::vault::VaultStore) over a JSON API
//! at `/v1/*`. The CLI's `provision` and `run` commands talk to it with the
//! Writer and Reader credentials issued by `POST /v1/sys/init`.

pub mod config;
pub mod error;
pub mod hardening;
pub mod middleware;
pub mod routes;
pub mod state;
