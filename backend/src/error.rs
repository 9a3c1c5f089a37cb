//! HTTP-facing error type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::fields::FieldError;
use crate::registration::RegistrationError;
use crate::review::ReviewError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Admin login required")]
    Unauthorized,

    #[error("Missing x-portal-client header")]
    MissingClient,

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::MissingClient => (StatusCode::BAD_REQUEST, "missing_client"),
            Error::StoreUnavailable(_) => (StatusCode::BAD_GATEWAY, "store_unavailable"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Error::NotFound(format!("Not found: {}", what)),
            StoreError::UniqueViolation(msg) => Error::Conflict(msg),
            StoreError::Transport(msg) => Error::StoreUnavailable(msg),
            StoreError::Database(msg) | StoreError::Decode(msg) => Error::Internal(msg),
        }
    }
}

impl From<FieldError> for Error {
    fn from(e: FieldError) -> Self {
        match e {
            FieldError::DuplicateName(_) => Error::Conflict(e.to_string()),
            FieldError::UnknownDefinition(_) => Error::NotFound(e.to_string()),
            other => Error::Validation(other.to_string()),
        }
    }
}

impl From<RegistrationError> for Error {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::DuplicateUserId => Error::Conflict(e.to_string()),
            RegistrationError::Field(inner) => inner.into(),
            RegistrationError::Store(inner) => inner.into(),
            other => Error::Validation(other.to_string()),
        }
    }
}

impl From<ReviewError> for Error {
    fn from(e: ReviewError) -> Self {
        match e {
            ReviewError::NotFound(_) => Error::NotFound(e.to_string()),
            ReviewError::Field(inner) => inner.into(),
            ReviewError::Store(inner) => inner.into(),
            other => Error::Validation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
