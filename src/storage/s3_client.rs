//! S3-compatible image storage
//!
//! Wraps the AWS SDK for MinIO, R2, B2 and AWS S3.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};

use super::{validate_key, ImageStorage, StoredImage};
use crate::config::StorageConfig;
use crate::error::{AppError, Result, StorageError};

/// S3-compatible image storage
#[derive(Clone)]
pub struct S3ImageStorage {
    client: Client,
    bucket: String,
}

impl S3ImageStorage {
    /// Create a new S3 client from configuration
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "inkcheck",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(s3_config);

        let bucket = config.bucket.clone();
        match client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => {
                tracing::info!(bucket = %bucket, provider = ?config.provider, "Connected to S3 bucket");
            }
            Err(e) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    bucket,
                    e
                );
            }
        }

        Ok(Self { client, bucket })
    }
}

fn is_missing(message: &str) -> bool {
    message.contains("404") || message.contains("NoSuchKey")
}

#[async_trait]
impl ImageStorage for S3ImageStorage {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        validate_key(key)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::SdkError(format!("Failed to put object {}: {}", key, e)))?;

        tracing::debug!(key = %key, bytes = data.len(), "Uploaded image to S3");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredImage> {
        validate_key(key)?;

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if is_missing(&message) {
                    AppError::Storage(StorageError::ObjectNotFound(key.to_string()))
                } else {
                    AppError::Storage(StorageError::SdkError(format!(
                        "Failed to get object {}: {}",
                        key, message
                    )))
                }
            })?;

        let content_type = response.content_type().map(|s| s.to_string());
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::SdkError(format!("Failed to read object body: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok(StoredImage { content_type, data })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        // S3 treats deleting a missing key as success
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::SdkError(format!("Failed to delete object {}: {}", key, e)))?;

        Ok(())
    }
}
