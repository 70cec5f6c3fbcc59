//! Error types for the gateway crate.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use tutor_core::CoreError;
use tutor_executor::ExecutorError;
use tutor_store::StoreError;

/// Errors surfaced to API callers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Malformed or invalid input.
    #[error("{0}")]
    BadRequest(String),

    /// Missing, unknown or expired session, or failed login.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(&'static str),

    /// Uniqueness violation, such as a duplicate email.
    #[error("{0}")]
    Conflict(String),

    /// Rate limit exceeded.
    #[error("too many requests, try again later")]
    TooManyRequests,

    /// Upload over the size limit.
    #[error("file too large")]
    PayloadTooLarge,

    /// The requested resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Store or sandbox infrastructure failure. The detail is logged, never
    /// sent to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Unauthorized with the generic message used for every session failure.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::Unauthorized("unauthorized")
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                "internal server error".to_owned()
            }
            other => other.to_string(),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => Self::Conflict("already exists".to_owned()),
            // The store names constraints and ids; keep them in the logs.
            StoreError::NotFound(what) => {
                tracing::debug!(%what, "store reported a missing row");
                Self::NotFound("not found".to_owned())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        tracing::debug!(error = %err.body_text(), "malformed multipart body");
        Self::BadRequest("invalid file".to_owned())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        Self::BadRequest(err.body_text())
    }
}

impl From<ExecutorError> for ApiError {
    fn from(err: ExecutorError) -> Self {
        Self::Internal(format!("sandbox: {err}"))
    }
}
