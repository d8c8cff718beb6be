//! Error taxonomy for the storage engine plus the HTTP-facing wrapper.
//!
//! Stores translate low-level failures into `StorageError` and let them
//! propagate unchanged; nothing below the handlers catches and
//! reinterprets. Client-facing variants carry short stable reasons;
//! I/O, SQL, and invariant failures are logged in full server-side and
//! reach the client as a generic 500.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

use crate::models::path::PathError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    BadPath(#[from] PathError),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("version mismatch on `{0}`")]
    VersionMismatch(String),
    #[error("`{0}` already exists")]
    AlreadyExists(String),
    #[error("conflict at `{path}`: {reason}")]
    Conflict { path: String, reason: String },
    #[error("metadata invariant violated for `{path}`: {detail}")]
    InvariantViolation { path: String, detail: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A lightweight wrapper for handler errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::BadPath(_) => AppError::bad_request(err.to_string()),
            StorageError::NotFound(_) => AppError::not_found(err.to_string()),
            StorageError::VersionMismatch(_) | StorageError::AlreadyExists(_) => {
                AppError::new(StatusCode::PRECONDITION_FAILED, err.to_string())
            }
            StorageError::Conflict { .. } => AppError::new(StatusCode::CONFLICT, err.to_string()),
            StorageError::InvariantViolation { .. }
            | StorageError::Sqlx(_)
            | StorageError::Io(_) => {
                tracing::error!("internal storage error: {}", err);
                AppError::internal("internal storage error")
            }
        }
    }
}

impl From<PathError> for AppError {
    fn from(err: PathError) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
