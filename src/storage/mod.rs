//! Object storage for uploaded images
//!
//! Supports the local filesystem and S3-compatible backends (MinIO,
//! Cloudflare R2, Backblaze B2, AWS S3).

mod local;
mod s3_client;

pub use local::LocalImageStorage;
pub use s3_client::S3ImageStorage;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};

/// Stored image bytes with their content type
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Trait for image storage backends
#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<StoredImage>;

    /// Deleting a missing object is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Build the backend selected by `STORAGE_PROVIDER`
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn ImageStorage>> {
    if config.provider.is_s3_compatible() {
        let storage = S3ImageStorage::new(config).await?;
        Ok(Arc::new(storage))
    } else {
        let storage = LocalImageStorage::new(config.local_path.clone()).await?;
        Ok(Arc::new(storage))
    }
}

/// Object key for an uploaded image: `images/<image_id>/<sanitized filename>`
pub fn storage_key(image_id: &str, filename: &str) -> String {
    format!("images/{}/{}", image_id, sanitize_filename(filename))
}

fn sanitize_filename(filename: &str) -> String {
    // Browsers on Windows may send the full client path
    let base = filename.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Reject keys that could escape the storage root
pub(crate) fn validate_key(key: &str) -> std::result::Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_sanitizes_filename() {
        assert_eq!(storage_key("abc", "page 1.png"), "images/abc/page_1.png");
        assert_eq!(storage_key("abc", "C:\\Users\\me\\scan.jpg"), "images/abc/scan.jpg");
        assert_eq!(storage_key("abc", "../../etc/passwd"), "images/abc/passwd");
        assert_eq!(storage_key("abc", ".."), "images/abc/upload");
        assert_eq!(storage_key("abc", ""), "images/abc/upload");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("images/abc/page.png").is_ok());
        assert!(validate_key("images/../secret").is_err());
        assert!(validate_key("/abs/path").is_err());
        assert!(validate_key("images//double").is_err());
        assert!(validate_key("").is_err());
    }
}
