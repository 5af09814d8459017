//! System routes: `/v1/sys/*`
//!
//! `init` creates the deployment's Writer and Reader principals and returns
//! their bearer credentials exactly once. `health` is public; `status`
//! requires any valid credential.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use keyseed_core::vault::StoreStatus;

use crate::error::AppError;
use crate::state::AppState;

/// Public `/v1/sys` routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/init", post(init))
        .route("/health", get(health))
}

/// Response body for `POST /v1/sys/init`.
#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub scope: String,
    pub writer_principal: String,
    /// Bearer credential for provisioning (shown once).
    pub writer_token: String,
    pub reader_principal: String,
    /// Bearer credential for workloads (shown once).
    pub reader_token: String,
}

/// Response body for `GET /v1/sys/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub initialized: bool,
}

async fn init(State(state): State<Arc<AppState>>) -> Result<(StatusCode, Json<InitResponse>), AppError> {
    let issued = state.store.initialize(state.generator.as_ref()).await?;
    let writer = issued.writer.credential();
    let reader = issued.reader.credential();
    info!(scope = %state.store.scope(), "principals issued");

    Ok((
        StatusCode::CREATED,
        Json(InitResponse {
            scope: state.store.scope().to_string(),
            writer_principal: writer.principal().to_string(),
            writer_token: writer.to_bearer().expose().to_owned(),
            reader_principal: reader.principal().to_string(),
            reader_token: reader.to_bearer().expose().to_owned(),
        }),
    ))
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok",
        initialized: state.store.is_initialized().await?,
    }))
}

/// `GET /v1/sys/status`, mounted behind the auth middleware.
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StoreStatus>, AppError> {
    Ok(Json(state.store.status().await?))
}
