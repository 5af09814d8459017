//! Authentication middleware.
//!
//! Extracts the `Authorization: Bearer <principal>.<token>` header, checks it
//! against the store's principals, and injects an [`AuthContext`] into the
//! request extensions. Per-secret permission checks happen in the store.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use keyseed_core::access::Credential;

use crate::error::AppError;
use crate::state::AppState;

/// Authentication context injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The authenticated credential, passed on to the store.
    pub credential: Credential,
}

/// Middleware that validates the bearer credential.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(bearer) = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return AppError::Unauthorized("missing bearer credential".to_owned()).into_response();
    };

    let credential = match Credential::parse(bearer) {
        Ok(c) => c,
        Err(e) => return AppError::from(e).into_response(),
    };

    match state.store.authenticate(&credential).await {
        Ok(binding) => {
            debug!(
                principal = %binding.principal.id,
                role = %binding.principal.role,
                path = %req.uri().path(),
                "request authenticated"
            );
            req.extensions_mut().insert(AuthContext { credential });
            next.run(req).await
        }
        Err(e) => AppError::from(e).into_response(),
    }
}
