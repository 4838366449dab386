//! Analysis Webhook
//!
//! Defines the webhook trait and the n8n implementation that posts an image
//! to the external vision workflow.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use super::types::{AnalysisError, ImageDimensions};

/// Image handed to the analysis service
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub image_id: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Dimensions decoded from the file itself, if known
    pub natural_dimensions: Option<ImageDimensions>,
}

/// Analysis webhook trait
#[async_trait]
pub trait AnalysisWebhook: Send + Sync {
    /// Endpoint description for logs
    fn endpoint(&self) -> &str;

    /// Submit an image; returns the parsed JSON body of a 2xx response
    async fn analyze(&self, upload: &ImageUpload) -> Result<Value, AnalysisError>;
}

/// n8n workflow webhook
pub struct N8nWebhook {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl N8nWebhook {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            timeout,
        }
    }

    fn form(upload: &ImageUpload) -> Result<Form, AnalysisError> {
        let image = Part::bytes(upload.bytes.clone())
            .file_name(upload.filename.clone())
            .mime_str(&upload.content_type)
            .map_err(|e| AnalysisError::Transport(format!("Invalid content type: {}", e)))?;

        Ok(Form::new()
            .part("image", image)
            .text("image_id", upload.image_id.clone())
            .text("filename", upload.filename.clone()))
    }
}

#[async_trait]
impl AnalysisWebhook for N8nWebhook {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn analyze(&self, upload: &ImageUpload) -> Result<Value, AnalysisError> {
        let form = Self::form(upload)?;

        let exchange = async {
            let response = self
                .client
                .post(&self.url)
                .multipart(form)
                .send()
                .await
                .map_err(|e| AnalysisError::Transport(format!("Failed to call webhook: {}", e)))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| AnalysisError::Transport(format!("Failed to read webhook body: {}", e)))?;

            Ok::<_, AnalysisError>((status, body))
        };

        // The deadline covers connect, upload and reading the body
        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| AnalysisError::Timeout(self.timeout))??;

        if !status.is_success() {
            return Err(AnalysisError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| AnalysisError::InvalidJson {
            reason: e.to_string(),
            body,
        })
    }
}

/// Mock webhook for testing
#[cfg(test)]
pub struct MockWebhook {
    pub reply: std::sync::Mutex<Option<Result<Value, AnalysisError>>>,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockWebhook {
    pub fn replying(reply: Result<Value, AnalysisError>) -> Self {
        Self {
            reply: std::sync::Mutex::new(Some(reply)),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl AnalysisWebhook for MockWebhook {
    fn endpoint(&self) -> &str {
        "mock://webhook"
    }

    async fn analyze(&self, _upload: &ImageUpload) -> Result<Value, AnalysisError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.reply
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(AnalysisError::Transport("no scripted reply".to_string())))
    }
}
