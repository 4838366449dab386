//! Analysis Submitter
//!
//! Drives one image through `processing` to a terminal state: post to the
//! webhook, normalize the reply, canonicalize every finding, persist.
//! Failures either substitute the mock analysis or mark the image `failed`,
//! depending on `fallback_on_failure`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::category::map_category;
use super::coordinates::parse_coordinates;
use super::mock::{mock_payload, mock_records};
use super::normalizer::normalize;
use super::types::{
    reconcile_dimensions, AnalysisError, ImageDimensions, NewDetectedError, NormalizedResponse,
    RawErrorRecord,
};
use super::webhook::{AnalysisWebhook, ImageUpload};
use crate::db::{AnalysisStore, ImageStatus};
use crate::error::Result;

const DEMO_MODE_REASON: &str = "webhook not configured";

/// Result of one analysis pass
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub image_id: String,
    pub status: ImageStatus,
    pub error_count: usize,
    /// True when the findings are the synthetic mock set
    pub mock: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Orchestrates webhook analysis for uploaded images
#[derive(Clone)]
pub struct AnalysisSubmitter {
    store: Arc<dyn AnalysisStore>,
    webhook: Option<Arc<dyn AnalysisWebhook>>,
    fallback_on_failure: bool,
}

impl AnalysisSubmitter {
    /// `webhook = None` runs every submission in demo mode
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        webhook: Option<Arc<dyn AnalysisWebhook>>,
        fallback_on_failure: bool,
    ) -> Self {
        Self {
            store,
            webhook,
            fallback_on_failure,
        }
    }

    pub fn is_live(&self) -> bool {
        self.webhook.is_some()
    }

    pub fn fallback_on_failure(&self) -> bool {
        self.fallback_on_failure
    }

    /// Analyze an image. Only persistence failures are returned as errors;
    /// analysis failures end in a terminal status instead.
    pub async fn submit(&self, upload: &ImageUpload) -> Result<AnalysisOutcome> {
        let image_id = upload.image_id.as_str();
        self.store
            .set_image_status(image_id, ImageStatus::Processing, None)
            .await?;

        match self.run(upload).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Best effort: leave the image failed rather than processing
                let payload = json!({ "error": e.to_string() });
                if let Err(mark) = self
                    .store
                    .set_image_status(image_id, ImageStatus::Failed, Some(&payload))
                    .await
                {
                    tracing::error!(image_id = %image_id, error = %mark, "Could not mark image failed");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, upload: &ImageUpload) -> Result<AnalysisOutcome> {
        let image_id = upload.image_id.as_str();

        let Some(webhook) = &self.webhook else {
            tracing::info!(image_id = %image_id, "Webhook not configured, using mock analysis");
            return self.run_mock_analysis(upload, DEMO_MODE_REASON, None).await;
        };

        tracing::info!(
            image_id = %image_id,
            endpoint = %webhook.endpoint(),
            bytes = upload.bytes.len(),
            "Submitting image for analysis"
        );

        let body = match webhook.analyze(upload).await {
            Ok(body) => body,
            Err(e) => {
                let upstream = e.raw_body().map(|raw| Value::String(raw.to_string()));
                return self.handle_failure(upload, e, upstream).await;
            }
        };

        match normalize(&body) {
            Ok(normalized) => self.complete(upload, normalized, &body).await,
            Err(e) => self.handle_failure(upload, e, Some(body)).await,
        }
    }

    /// Record the frame a pass parsed its coordinates against
    async fn record_frame(&self, image_id: &str, frame: ImageDimensions) -> Result<()> {
        self.store
            .set_image_original_dimensions(image_id, frame.width, frame.height)
            .await
    }

    async fn complete(
        &self,
        upload: &ImageUpload,
        normalized: NormalizedResponse,
        raw: &Value,
    ) -> Result<AnalysisOutcome> {
        let image_id = upload.image_id.as_str();

        let frame = reconcile_dimensions(normalized.image_dimensions, upload.natural_dimensions)
            .unwrap_or(ImageDimensions::FALLBACK);
        self.record_frame(image_id, frame).await?;

        let records = build_records(image_id, &normalized.errors, frame);
        let inserted = self.store.bulk_insert_errors(&records).await?;

        self.store
            .set_image_status(image_id, ImageStatus::Completed, Some(raw))
            .await?;

        tracing::info!(
            image_id = %image_id,
            error_count = inserted.len(),
            frame_width = frame.width,
            frame_height = frame.height,
            "Analysis completed"
        );

        Ok(AnalysisOutcome {
            image_id: image_id.to_string(),
            status: ImageStatus::Completed,
            error_count: inserted.len(),
            mock: false,
            failure: None,
        })
    }

    async fn handle_failure(
        &self,
        upload: &ImageUpload,
        error: AnalysisError,
        upstream: Option<Value>,
    ) -> Result<AnalysisOutcome> {
        let reason = error.to_string();

        if self.fallback_on_failure {
            tracing::warn!(
                image_id = %upload.image_id,
                error = %reason,
                "Analysis failed, substituting mock analysis"
            );
            let mut outcome = self.run_mock_analysis(upload, &reason, upstream).await?;
            outcome.failure = Some(reason);
            return Ok(outcome);
        }

        tracing::warn!(
            image_id = %upload.image_id,
            error = %reason,
            "Analysis failed"
        );

        let mut payload = json!({ "error": reason });
        if let Some(upstream) = upstream {
            payload["upstream"] = upstream;
        }

        self.store
            .set_image_status(&upload.image_id, ImageStatus::Failed, Some(&payload))
            .await?;

        Ok(AnalysisOutcome {
            image_id: upload.image_id.clone(),
            status: ImageStatus::Failed,
            error_count: 0,
            mock: false,
            failure: Some(reason),
        })
    }

    /// Persist the fixed mock set and complete the image
    async fn run_mock_analysis(
        &self,
        upload: &ImageUpload,
        reason: &str,
        upstream: Option<Value>,
    ) -> Result<AnalysisOutcome> {
        let image_id = upload.image_id.as_str();
        let frame = upload
            .natural_dimensions
            .filter(ImageDimensions::is_valid)
            .unwrap_or(ImageDimensions::FALLBACK);
        self.record_frame(image_id, frame).await?;

        let records = mock_records(image_id, frame);
        let inserted = self.store.bulk_insert_errors(&records).await?;

        self.store
            .set_image_status(
                image_id,
                ImageStatus::Completed,
                Some(&mock_payload(reason, upstream)),
            )
            .await?;

        Ok(AnalysisOutcome {
            image_id: image_id.to_string(),
            status: ImageStatus::Completed,
            error_count: inserted.len(),
            mock: true,
            failure: None,
        })
    }
}

/// Canonicalize raw findings against the image frame
pub fn build_records(
    image_id: &str,
    errors: &[RawErrorRecord],
    frame: ImageDimensions,
) -> Vec<NewDetectedError> {
    errors
        .iter()
        .map(|raw| NewDetectedError {
            image_id: image_id.to_string(),
            category: map_category(raw.error_type.as_deref().unwrap_or_default()),
            original_text: raw.found_text.clone(),
            corrected_text: raw.corrected_text.clone(),
            description: raw.issue_description.clone(),
            rect: parse_coordinates(raw.coordinates.as_ref(), Some(frame)),
            frame,
        })
        .collect()
}
