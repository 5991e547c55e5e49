//! Error types for the library server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable numeric codes carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    DbFailure = 3,
    NoSuchData = 5,
    NotAvailable = 7,
    Duplicate = 8,
    BadValue = 18,
    AlreadyReturned = 22,
    Inconsistent = 23,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Already returned: {0}")]
    AlreadyReturned(String),

    /// An invariant the ledger guards was found broken. Always a bug.
    #[error("Internal consistency violation: {0}")]
    InternalConsistency(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status the facade answers with for this error kind
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_)
            | AppError::InvalidArgument(_)
            | AppError::AlreadyReturned(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InternalConsistency(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this error reports a defect rather than an expected user-facing condition
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            AppError::InternalConsistency(_) | AppError::Database(_) | AppError::Internal(_)
        )
    }
}

impl From<sqlx::Error> for AppError {
    /// Unique-constraint violations are conflicts a client can act on, not outages.
    fn from(error: sqlx::Error) -> Self {
        let duplicate = error
            .as_database_error()
            .filter(|db| db.is_unique_violation())
            .map(|db| db.message().to_string());
        match duplicate {
            Some(message) => AppError::Conflict(format!("Duplicate value: {}", message)),
            None => AppError::Database(error),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::InvalidArgument(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            AppError::NotFound(msg) => (ErrorCode::NoSuchData, msg.clone()),
            AppError::Unavailable(msg) => (ErrorCode::NotAvailable, msg.clone()),
            AppError::InvalidArgument(msg) => (ErrorCode::BadValue, msg.clone()),
            AppError::AlreadyReturned(msg) => (ErrorCode::AlreadyReturned, msg.clone()),
            AppError::Conflict(msg) => (ErrorCode::Duplicate, msg.clone()),
            AppError::InternalConsistency(msg) => {
                tracing::error!(target: "library_server::consistency", "Invariant violated: {}", msg);
                (
                    ErrorCode::Inconsistent,
                    "Internal consistency error".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (ErrorCode::DbFailure, "Database error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (ErrorCode::Failure, "Internal server error".to_string())
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
