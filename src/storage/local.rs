//! Local filesystem image storage

use std::path::PathBuf;

use async_trait::async_trait;

use super::{validate_key, ImageStorage, StoredImage};
use crate::error::{Result, StorageError};

/// Images stored under a root directory, one file per key
pub struct LocalImageStorage {
    base_path: PathBuf,
}

impl LocalImageStorage {
    pub async fn new(base_path: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&base_path).await?;
        tracing::info!(path = %base_path.display(), "Using local image storage");
        Ok(Self { base_path })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ImageStorage for LocalImageStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;

        tracing::debug!(key = %key, bytes = data.len(), "Stored image");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredImage> {
        let path = self.object_path(key)?;
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::ObjectNotFound(key.to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(StoredImage {
            content_type: mime_guess::from_path(&path).first().map(|m| m.to_string()),
            data,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        // Remove the per-image directory when it is left empty
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::remove_dir(parent).await;
        }
        Ok(())
    }
}
