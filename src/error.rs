//! Error types for Toolcrib server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error codes returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    DbFailure = 3,
    ToolNotFound = 4,
    ToolNotAvailable = 5,
    ToolOverdueForCalibration = 6,
    ToolNotCheckedOut = 7,
    NotFound = 8,
    DuplicateId = 9,
    InvalidInput = 10,
    InvalidStatus = 11,
    InvalidBatchOperation = 12,
    UserHoldsTools = 13,
    Conflict = 14,
}

/// Coarse error classes, as seen by clients choosing how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    /// Calibration-blocked checkout, a conflict worth telling apart
    Overdue,
    Internal,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Tool {0} not found")]
    ToolNotFound(String),

    #[error("Tool {0} is not available")]
    ToolNotAvailable(String),

    #[error("Tool {0} is overdue for calibration")]
    ToolOverdueForCalibration(String),

    #[error("Tool {0} is not checked out")]
    ToolNotCheckedOut(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("User {0} still holds checked-out tools")]
    UserHoldsTools(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid batch operation: {0}")]
    InvalidBatchOperation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::ToolNotFound(_) => ErrorCode::ToolNotFound,
            AppError::ToolNotAvailable(_) => ErrorCode::ToolNotAvailable,
            AppError::ToolOverdueForCalibration(_) => ErrorCode::ToolOverdueForCalibration,
            AppError::ToolNotCheckedOut(_) => ErrorCode::ToolNotCheckedOut,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::DuplicateId(_) => ErrorCode::DuplicateId,
            AppError::UserHoldsTools(_) => ErrorCode::UserHoldsTools,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::Validation(_) => ErrorCode::InvalidInput,
            AppError::InvalidStatus(_) => ErrorCode::InvalidStatus,
            AppError::InvalidBatchOperation(_) => ErrorCode::InvalidBatchOperation,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ToolNotFound(_) | AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::ToolNotAvailable(_)
            | AppError::ToolNotCheckedOut(_)
            | AppError::DuplicateId(_)
            | AppError::UserHoldsTools(_)
            | AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::ToolOverdueForCalibration(_) => ErrorKind::Overdue,
            AppError::Validation(_)
            | AppError::InvalidStatus(_)
            | AppError::InvalidBatchOperation(_) => ErrorKind::InvalidInput,
            AppError::Database(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Translate constraint violations raised by the store into business errors.
    ///
    /// Anything that is not a recognised constraint stays a `Database` error.
    pub fn from_store(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            let message = db.message().to_string();
            match db.code().as_deref() {
                Some("23505") => return AppError::Conflict(message),
                Some("23503") | Some("23514") => return AppError::Conflict(message),
                Some("22P02") | Some("22007") | Some("22008") => {
                    return AppError::Validation(message)
                }
                _ => {}
            }
        }
        AppError::Database(err)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
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
        let status = match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict | ErrorKind::Overdue => StatusCode::CONFLICT,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let code = self.code();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overdue_is_its_own_kind() {
        let err = AppError::ToolOverdueForCalibration("TW-004".into());
        assert_eq!(err.kind(), ErrorKind::Overdue);
        assert_eq!(err.code(), ErrorCode::ToolOverdueForCalibration);
    }

    #[test]
    fn test_status_mapping() {
        let response = AppError::ToolNotAvailable("T-1".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = AppError::InvalidBatchOperation("status".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::ToolNotFound("T-9".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_non_database_sqlx_error_stays_internal() {
        let err = AppError::from_store(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
