use crate::{
    config::ConfigError,
    services::{object_store::StorageError, vqa_service::VqaServiceError},
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
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

    /// Shortcut for 412 Precondition Failed, used when the client sent no usable image.
    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::PRECONDITION_FAILED, msg)
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

/// Browse endpoints report missing configuration as 404, like an absent bucket.
impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::not_found(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = match &err {
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            StorageError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            StorageError::InvalidBucketName { .. } | StorageError::InvalidObjectKey => {
                StatusCode::BAD_REQUEST
            }
            StorageError::Upstream { .. } | StorageError::Http(_) | StorageError::Auth(_) => {
                StatusCode::BAD_GATEWAY
            }
            StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<VqaServiceError> for AppError {
    fn from(err: VqaServiceError) -> Self {
        match err {
            VqaServiceError::Storage(storage) => storage.into(),
            VqaServiceError::EmptyBucket(_) | VqaServiceError::NoImage(_) => {
                AppError::not_found(err.to_string())
            }
            other => AppError::internal(other.to_string()),
        }
    }
}
