//! Secret routes: `/v1/secrets/{name}`
//!
//! - `GET  /v1/secrets/{name}`: read (Reader)
//! - `PUT  /v1/secrets/{name}`: create or update (Writer)
//! - `GET  /v1/secrets/{name}/exists`: presence check (Writer)
//!
//! The store decides what each principal may do; handlers only translate.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};

use keyseed_core::secret::{SecretName, SecretValue};
use keyseed_core::store::SecretStore;

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::state::AppState;

/// Build the `/v1/secrets` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{name}", get(read_secret).put(write_secret))
        .route("/{name}/exists", get(secret_exists))
}

/// Request body for `PUT /v1/secrets/{name}`.
#[derive(Deserialize)]
pub struct WriteRequest {
    pub value: SecretValue,
}

/// Response body for `GET /v1/secrets/{name}`.
#[derive(Serialize)]
pub struct SecretResponse {
    pub name: String,
    pub value: SecretValue,
}

/// Response body for `GET /v1/secrets/{name}/exists`.
#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub name: String,
    pub exists: bool,
}

fn parse_name(raw: String) -> Result<SecretName, AppError> {
    SecretName::parse(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

async fn read_secret(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> Result<Json<SecretResponse>, AppError> {
    let name = parse_name(name)?;
    let value = state.store.get(&ctx.credential, &name).await?;
    Ok(Json(SecretResponse {
        name: name.to_string(),
        value,
    }))
}

async fn write_secret(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
    Json(body): Json<WriteRequest>,
) -> Result<StatusCode, AppError> {
    let name = parse_name(name)?;
    if body.value.is_empty() {
        return Err(AppError::BadRequest("secret value must not be empty".to_owned()));
    }
    state.store.set(&ctx.credential, &name, &body.value).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn secret_exists(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(name): Path<String>,
) -> Result<Json<ExistsResponse>, AppError> {
    let name = parse_name(name)?;
    let exists = state.store.exists(&ctx.credential, &name).await?;
    Ok(Json(ExistsResponse {
        name: name.to_string(),
        exists,
    }))
}
