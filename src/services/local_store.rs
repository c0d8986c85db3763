//! Disk-backed object store for local runs and tests.
//!
//! Each bucket is a directory beneath `base_path`; object keys map to
//! relative paths inside it, so `photos/2025/img.jpg` is a nested file.

use crate::services::object_store::{ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const TMP_PREFIX: &str = ".tmp-";

#[derive(Clone, Debug)]
pub struct LocalStore {
    /// Directory holding one subdirectory per bucket.
    pub base_path: PathBuf,
}

impl LocalStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Create the directory backing `name`. Existing buckets are kept.
    pub async fn create_bucket(&self, name: &str) -> StorageResult<()> {
        ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Resolve the bucket directory, failing if it was never created.
    async fn existing_bucket_root(&self, bucket: &str) -> StorageResult<PathBuf> {
        ensure_bucket_name_safe(bucket)?;
        let root = self.bucket_root(bucket);
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(root),
            Ok(_) => Err(StorageError::BucketNotFound(bucket.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::BucketNotFound(bucket.to_string()))
            }
            Err(err) => Err(map_io(err, bucket)),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn read(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        ensure_key_safe(key)?;
        let root = self.existing_bucket_root(bucket).await?;
        match fs::read(root.join(key)).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
                Err(StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            Err(err) => Err(map_io(err, bucket)),
        }
    }

    /// Write through a temp file and rename so readers never see partial content.
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        _content_type: &str,
        content: Bytes,
    ) -> StorageResult<()> {
        ensure_key_safe(key)?;
        let root = self.existing_bucket_root(bucket).await?;
        let file_path = root.join(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()));
        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&content).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &file_path).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(map_io(err, bucket));
        }
        debug!("wrote {} bytes to {}", content.len(), file_path.display());
        Ok(())
    }

    /// Recursive listing in lexicographic key order, like Cloud Storage.
    async fn list(&self, bucket: &str, max_results: usize) -> StorageResult<Vec<String>> {
        let root = self.existing_bucket_root(bucket).await?;
        let mut names = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(|e| map_io(e, bucket))?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    names.push(key);
                }
            }
        }

        names.sort();
        names.truncate(max_results);
        Ok(names)
    }
}

fn map_io(err: io::Error, bucket: &str) -> StorageError {
    if err.kind() == ErrorKind::PermissionDenied {
        StorageError::PermissionDenied(bucket.to_string())
    } else {
        StorageError::Io(err)
    }
}

/// Reject keys that could escape the bucket directory.
fn ensure_key_safe(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StorageError::InvalidObjectKey);
    }
    if key.starts_with('/') || key.ends_with('/') || key.split('/').any(|s| s == ".." || s == ".")
    {
        return Err(StorageError::InvalidObjectKey);
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StorageError::InvalidObjectKey);
    }
    Ok(())
}

/// Cloud Storage naming rules: 3-63 chars of lowercase letters, digits,
/// dots, hyphens and underscores, alphanumeric at both ends, not an IPv4.
fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.into(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-' | '_'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, hyphens, and underscores",
        ));
    }
    let alnum = |c: Option<char>| c.map(|c| c.is_ascii_alphanumeric()).unwrap_or(false);
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }
    if name.contains("..") {
        return Err(invalid("cannot contain consecutive dots"));
    }
    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }
    Ok(())
}

fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
