//! Unified API error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::api::models::ErrorResponse;
use crate::error::IndexerError;

/// API-specific error type.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Invalid request parameters.
    BadRequest(String),
    /// A sync run failed.
    SyncFailed(String),
    /// Another sync run holds the cursor.
    Conflict(String),
    /// Internal server error.
    InternalError(String),
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Database operation failed.
    DatabaseError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg)),
            ApiError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "Sync already in progress",
                Some(msg),
            ),
            ApiError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. Please try again later.",
                None,
            ),
            ApiError::SyncFailed(msg) => {
                error!(error = %msg, "Member sync failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to sync members",
                    Some(msg),
                )
            }
            ApiError::DatabaseError(msg) => {
                error!(error = %msg, "Database error in API handler");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database operation failed",
                    None,
                )
            }
            ApiError::InternalError(msg) => {
                error!(error = %msg, "Internal error in API handler");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            details,
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

impl From<IndexerError> for ApiError {
    fn from(err: IndexerError) -> Self {
        match err {
            IndexerError::DatabaseError { message, .. } => ApiError::DatabaseError(message),
            IndexerError::ValidationError { message } => ApiError::BadRequest(message),
            IndexerError::CursorConflict { .. } => ApiError::Conflict(err.to_string()),
            _ => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err.to_string())
    }
}
