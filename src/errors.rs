//! # Error Types
//!
//! Every failure the upload workflow can surface to a caller. Each variant has
//! a stable error code and an HTTP status so handlers can render it directly.

use http::StatusCode;
use serde_json::json;
use thiserror::Error;
use worker::{Error as WorkerError, Response};

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Concurrent upload limit of {limit} reached")]
    UploadConcurrentLimit { limit: usize },

    #[error("Not enough storage: {projected} bytes would exceed the {limit} byte limit")]
    NotEnoughTotalUsage { projected: u64, limit: u64 },

    #[error("Upload session not found: {file_id}")]
    FileNotFound { file_id: String },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("Uploaded object not found: {path}")]
    ObjectNotFound { path: String },

    #[error("Upload policy rejected: {reason}")]
    PolicyRejected { reason: String },

    #[error("Storage usage changed concurrently for user {user_id}")]
    UsageConflict { user_id: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("File size {size} exceeds maximum allowed size {max}")]
    FileSizeExceeded { size: u64, max: u64 },

    #[error("Storage backend error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl AppError {
    pub fn storage(message: impl ToString) -> Self {
        AppError::Storage {
            message: message.to_string(),
        }
    }

    /// Stable, caller-visible error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UploadConcurrentLimit { .. } => "UploadConcurrentLimit",
            AppError::NotEnoughTotalUsage { .. } => "NotEnoughTotalUsage",
            AppError::FileNotFound { .. } => "FileNotFound",
            AppError::DirectoryNotFound { .. } => "DirectoryNotFound",
            AppError::ObjectNotFound { .. } => "ObjectNotFound",
            AppError::PolicyRejected { .. } => "UploadPolicyRejected",
            AppError::UsageConflict { .. } => "UsageConflict",
            AppError::MissingField { .. } | AppError::InvalidField { .. } => "ParamsCheckFailed",
            AppError::FileSizeExceeded { .. } => "FileSizeTooBig",
            AppError::Storage { .. } | AppError::Internal { .. } | AppError::Worker(_) => {
                "ServerFail"
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UploadConcurrentLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotEnoughTotalUsage { .. } => StatusCode::INSUFFICIENT_STORAGE,
            AppError::FileNotFound { .. }
            | AppError::DirectoryNotFound { .. }
            | AppError::ObjectNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::PolicyRejected { .. } => StatusCode::FORBIDDEN,
            AppError::UsageConflict { .. } => StatusCode::CONFLICT,
            AppError::MissingField { .. } | AppError::InvalidField { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::FileSizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Storage { .. } | AppError::Internal { .. } | AppError::Worker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Quota violations are expected in normal operation and are not system faults.
    pub fn is_quota_violation(&self) -> bool {
        matches!(
            self,
            AppError::UploadConcurrentLimit { .. } | AppError::NotEnoughTotalUsage { .. }
        )
    }

    /// Renders the error as a JSON response with the matching status code.
    pub fn to_response(&self) -> worker::Result<Response> {
        let body = json!({
            "status": "Failed",
            "code": self.code(),
            "message": self.to_string(),
        });
        Ok(Response::from_json(&body)?.with_status(self.status_code().as_u16()))
    }
}

impl From<AppError> for WorkerError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Worker(e) => e,
            other => WorkerError::RustError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal {
            message: error.to_string(),
        }
    }
}
