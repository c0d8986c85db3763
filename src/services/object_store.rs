//! Bucket/key blob storage used by every entrypoint.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Upper bound on names returned by one listing.
pub const FILE_LIST_SIZE_MAX: usize = 8196;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("permission denied on `{0}`")]
    PermissionDenied(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("storage returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Auth(#[from] crate::services::auth::AuthError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. }
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Read a whole object into memory.
    async fn read(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    /// Create or overwrite an object.
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        content: Bytes,
    ) -> StorageResult<()>;

    /// Object names in listing order, at most `max_results` of them.
    async fn list(&self, bucket: &str, max_results: usize) -> StorageResult<Vec<String>>;
}
