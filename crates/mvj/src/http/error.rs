use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::store::{NestedError, RepositoryError};

/// Error returned by every REST handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("authentication credentials were not provided or are invalid")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("upstream service failed: {0}")]
    BadGateway(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(message: impl ToString) -> Self {
        ApiError::BadRequest(message.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        match &self {
            ApiError::Internal(_) | ApiError::BadGateway(_) => {
                tracing::error!(status = status.as_u16(), %message, "request failed");
            }
            _ => tracing::debug!(status = status.as_u16(), %message, "request rejected"),
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound { .. } => ApiError::NotFound(value.to_string()),
            RepositoryError::Conflict | RepositoryError::Protected { .. } => {
                ApiError::Conflict(value.to_string())
            }
            RepositoryError::Unavailable(_) => ApiError::Internal(value.to_string()),
        }
    }
}

impl From<NestedError> for ApiError {
    fn from(value: NestedError) -> Self {
        ApiError::BadRequest(value.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::BadRequest(value.to_string())
    }
}
