//! Error types for the Inkcheck server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("S3 SDK error: {0}")]
    SdkError(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::UnsupportedMediaType(content_type) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "invalid_file_type",
                format!(
                    "Unsupported image type '{}'. Please upload a JPG, PNG, or GIF image",
                    content_type
                ),
            ),
            AppError::PayloadTooLarge { max, .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "file_too_large",
                format!("Image must be smaller than {} bytes", max),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                match e {
                    StorageError::ObjectNotFound(key) => {
                        (StatusCode::NOT_FOUND, "not_found", format!("Object not found: {}", key))
                    }
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "storage_error",
                        "Storage error".to_string(),
                    ),
                }
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
            AppError::Multipart(e) => {
                tracing::warn!("Multipart error: {}", e);
                (e.status(), "upload_failed", e.body_text())
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "io_error",
                    "IO error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
