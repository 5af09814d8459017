//! HTTP error types.
//!
//! Maps [`StoreError`] into HTTP responses. Every error produces a JSON body
//! with a machine-readable `error` field and a human-readable `message`.
//! Messages name secrets and operations, never values.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use keyseed_core::error::StoreError;

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Missing or invalid credential.
    Unauthorized(String),
    /// The role binding does not allow the operation.
    Forbidden(String),
    /// Requested secret not found.
    NotFound(String),
    /// Client sent invalid input.
    BadRequest(String),
    /// Already initialized.
    Conflict(String),
    /// The store has no principals yet.
    NotInitialized,
    /// Internal server error.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::NotInitialized => (
                StatusCode::SERVICE_UNAVAILABLE,
                "not_initialized",
                "secret store is not initialized".to_owned(),
            ),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        (
            status,
            axum::Json(ErrorBody {
                error: error_type,
                message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MalformedCredential | StoreError::Unauthenticated => {
                Self::Unauthorized(err.to_string())
            }
            StoreError::PermissionDenied { .. } => Self::Forbidden(err.to_string()),
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::AlreadyInitialized => Self::Conflict(err.to_string()),
            StoreError::NotInitialized => Self::NotInitialized,
            StoreError::InvalidName(_) => Self::BadRequest(err.to_string()),
            StoreError::InvalidBinding(_)
            | StoreError::Generator(_)
            | StoreError::Transport { .. }
            | StoreError::Barrier(_)
            | StoreError::Internal { .. } => {
                error!(error = %err, "secret store failure");
                Self::Internal("internal secret store error".to_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use keyseed_core::store::StoreOperation;

    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (StoreError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                StoreError::PermissionDenied {
                    operation: StoreOperation::Set,
                    name: "admin-token".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                StoreError::NotFound {
                    name: "admin-token".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (StoreError::AlreadyInitialized, StatusCode::CONFLICT),
            (StoreError::NotInitialized, StatusCode::SERVICE_UNAVAILABLE),
            (
                StoreError::Internal {
                    reason: "disk".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
