//! Errors returned by the API handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use social_auth::GateError;
use social_storage::StorageError;

/// Handler errors.
///
/// Gatekeeper failures keep their own status codes and headers; everything
/// else is mapped here.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Rejected by the gatekeeper.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// The addressed resource does not exist (404).
    #[error("{0} not found")]
    NotFound(String),

    /// The request is invalid (400).
    #[error("{0}")]
    BadRequest(String),

    /// The request conflicts with current state (409).
    #[error("{0}")]
    Conflict(String),

    /// Generic internal error (500).
    #[error("{0}")]
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, .. } => Self::NotFound(kind),
            StorageError::Conflict { message } => Self::Conflict(message),
            StorageError::Invalid { message } => Self::BadRequest(message),
            other => Self::Gate(GateError::from(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Gate(err) => return err.into_response(),
            Self::NotFound(kind) => (StatusCode::NOT_FOUND, format!("{kind} not found")),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "the server encountered a problem".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
