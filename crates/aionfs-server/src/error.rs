//! HTTP error types for `aionfsd`.
//!
//! Maps lifecycle errors from `aionfs-core` into HTTP responses. Every error
//! produces a JSON body with a machine-readable `error` code and a
//! human-readable `message`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use aionfs_core::error::{CatalogError, LifecycleError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Missing or unrecognised bearer token.
    Unauthorized(String),
    /// Body could not be decoded.
    InvalidPayload(String),
    /// Create without an owner while authorization is disabled.
    MissingOwner(String),
    /// Attach without a principal while authorization is disabled.
    MissingPrincipal(String),
    /// The principal is not allowed to act on the resource.
    PrincipalMismatch(String),
    /// Unknown volume.
    NotFound(String),
    /// A checkpoint named an unknown volume.
    InvalidVolume(String),
    /// Re-attach rejected by policy.
    SessionConflict(String),
    /// The state could not be persisted.
    Store(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    /// Status and machine-readable code for this error.
    #[must_use]
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "invalid_payload"),
            Self::MissingOwner(_) => (StatusCode::BAD_REQUEST, "missing_owner"),
            Self::MissingPrincipal(_) => (StatusCode::BAD_REQUEST, "missing_principal"),
            Self::PrincipalMismatch(_) => (StatusCode::FORBIDDEN, "principal_mismatch"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::InvalidVolume(_) => (StatusCode::BAD_REQUEST, "invalid_volume"),
            Self::SessionConflict(_) => (StatusCode::CONFLICT, "session_conflict"),
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_code();
        let message = match self {
            Self::Unauthorized(msg)
            | Self::InvalidPayload(msg)
            | Self::MissingOwner(msg)
            | Self::MissingPrincipal(msg)
            | Self::PrincipalMismatch(msg)
            | Self::NotFound(msg)
            | Self::InvalidVolume(msg)
            | Self::SessionConflict(msg)
            | Self::Store(msg) => msg,
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { .. } => Self::NotFound(err.to_string()),
            CatalogError::InvalidVolume { .. } => Self::InvalidVolume(err.to_string()),
            CatalogError::PrincipalMismatch { .. } => Self::PrincipalMismatch(err.to_string()),
            CatalogError::SessionConflict { .. } => Self::SessionConflict(err.to_string()),
            CatalogError::Store(ref inner) => {
                error!(error = %inner, "state commit failed");
                Self::Store(err.to_string())
            }
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Unauthenticated => Self::Unauthorized(err.to_string()),
            LifecycleError::MissingOwner => Self::MissingOwner(err.to_string()),
            LifecycleError::MissingPrincipal => Self::MissingPrincipal(err.to_string()),
            LifecycleError::InvalidPayload { .. } => Self::InvalidPayload(err.to_string()),
            LifecycleError::PrincipalMismatch { .. } => Self::PrincipalMismatch(err.to_string()),
            LifecycleError::Catalog(inner) => inner.into(),
        }
    }
}
