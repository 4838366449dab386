//! Persistence boundary used by the analysis pipeline

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::analysis::{Category, NewDetectedError};
use crate::error::{AppError, Result};

use super::errors::{summarize, DetectedError, ErrorRepository};
use super::images::{ImageRecord, ImageRepository, ImageStatus};

/// Image together with its findings
#[derive(Debug, Clone, Serialize)]
pub struct ImageWithErrors {
    #[serde(flatten)]
    pub image: ImageRecord,
    pub errors: Vec<DetectedError>,
    pub summary: BTreeMap<Category, usize>,
}

/// Operations the analysis pipeline needs from storage.
///
/// Each call is atomic on its own; callers do not retry.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn set_image_status(
        &self,
        image_id: &str,
        status: ImageStatus,
        raw_response: Option<&Value>,
    ) -> Result<()>;

    async fn set_image_original_dimensions(&self, image_id: &str, width: u32, height: u32) -> Result<()>;

    async fn bulk_insert_errors(&self, records: &[NewDetectedError]) -> Result<Vec<DetectedError>>;

    async fn get_image_with_errors(&self, image_id: &str) -> Result<Option<ImageWithErrors>>;
}

/// SQLite-backed [`AnalysisStore`]
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for SqliteStore {
    async fn set_image_status(
        &self,
        image_id: &str,
        status: ImageStatus,
        raw_response: Option<&Value>,
    ) -> Result<()> {
        let updated = ImageRepository::new(&self.pool)
            .set_status(image_id, status, raw_response)
            .await?;
        if !updated {
            return Err(AppError::NotFound(format!("Image not found: {}", image_id)));
        }
        Ok(())
    }

    async fn set_image_original_dimensions(&self, image_id: &str, width: u32, height: u32) -> Result<()> {
        let updated = ImageRepository::new(&self.pool)
            .set_original_dimensions(image_id, width, height)
            .await?;
        if !updated {
            return Err(AppError::NotFound(format!("Image not found: {}", image_id)));
        }
        Ok(())
    }

    async fn bulk_insert_errors(&self, records: &[NewDetectedError]) -> Result<Vec<DetectedError>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        ErrorRepository::new(&self.pool).insert_many(records).await
    }

    async fn get_image_with_errors(&self, image_id: &str) -> Result<Option<ImageWithErrors>> {
        let Some(image) = ImageRepository::new(&self.pool).get(image_id).await? else {
            return Ok(None);
        };
        let errors = ErrorRepository::new(&self.pool).list_for_image(image_id).await?;
        let summary = summarize(&errors);

        Ok(Some(ImageWithErrors {
            image,
            errors,
            summary,
        }))
    }
}
