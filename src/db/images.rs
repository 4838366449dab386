//! Image record database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::analysis::{reconcile_dimensions, ImageDimensions};
use crate::error::{AppError, Result};

/// Analysis state of an image.
///
/// `pending -> processing -> completed | failed`; a retry re-enters `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ImageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Image record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ImageRecord {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub storage_key: String,
    pub file_size: i64,
    pub status: ImageStatus,
    pub raw_response: Option<Json<Value>>,
    pub original_width: Option<i64>,
    pub original_height: Option<i64>,
    pub natural_width: Option<i64>,
    pub natural_height: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl ImageRecord {
    /// Frame recorded by the last analysis pass
    pub fn original_dimensions(&self) -> Option<ImageDimensions> {
        ImageDimensions::from_columns(self.original_width, self.original_height)
    }

    /// Dimensions decoded from the uploaded file
    pub fn natural_dimensions(&self) -> Option<ImageDimensions> {
        ImageDimensions::from_columns(self.natural_width, self.natural_height)
    }

    /// Frame the stored rectangles are expressed in
    pub fn coordinate_frame(&self) -> Option<ImageDimensions> {
        reconcile_dimensions(self.original_dimensions(), self.natural_dimensions())
    }
}

/// Create image request
#[derive(Debug, Clone)]
pub struct NewImage {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub storage_key: String,
    pub file_size: i64,
    pub natural_dimensions: Option<ImageDimensions>,
}

const IMAGE_COLUMNS: &str = "id, filename, content_type, storage_key, file_size, status, \
     raw_response, original_width, original_height, natural_width, natural_height, \
     created_at, updated_at";

/// Image repository
pub struct ImageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ImageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a specific image
    pub async fn get(&self, id: &str) -> Result<Option<ImageRecord>> {
        let image = sqlx::query_as::<_, ImageRecord>(&format!(
            "SELECT {} FROM images WHERE id = ?",
            IMAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(image)
    }

    /// List all images, newest first
    pub async fn list(&self) -> Result<Vec<ImageRecord>> {
        let images = sqlx::query_as::<_, ImageRecord>(&format!(
            "SELECT {} FROM images ORDER BY created_at DESC, rowid DESC",
            IMAGE_COLUMNS
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(images)
    }

    /// Create a new image record in `pending` state
    pub async fn create(&self, data: &NewImage) -> Result<ImageRecord> {
        let now = Utc::now().to_rfc3339();
        let natural = data.natural_dimensions;

        sqlx::query(
            r#"
            INSERT INTO images (id, filename, content_type, storage_key, file_size, status,
                                natural_width, natural_height, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&data.id)
        .bind(&data.filename)
        .bind(&data.content_type)
        .bind(&data.storage_key)
        .bind(data.file_size)
        .bind(ImageStatus::Pending)
        .bind(natural.map(|d| d.width as i64))
        .bind(natural.map(|d| d.height as i64))
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(&data.id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created image".to_string()))
    }

    /// Update status, replacing the stored raw response when one is given
    pub async fn set_status(
        &self,
        id: &str,
        status: ImageStatus,
        raw_response: Option<&Value>,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let result = match raw_response {
            Some(raw) => {
                sqlx::query(
                    "UPDATE images SET status = ?, raw_response = ?, updated_at = ? WHERE id = ?",
                )
                .bind(status)
                .bind(Json(raw))
                .bind(&now)
                .bind(id)
                .execute(self.pool)
                .await?
            }
            None => {
                sqlx::query("UPDATE images SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(status)
                    .bind(&now)
                    .bind(id)
                    .execute(self.pool)
                    .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    /// Record the frame the latest analysis pass parsed against
    pub async fn set_original_dimensions(&self, id: &str, width: u32, height: u32) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE images SET original_width = ?, original_height = ?, updated_at = ? WHERE id = ?",
        )
        .bind(width as i64)
        .bind(height as i64)
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete an image and its findings
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM detected_errors WHERE image_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use serde_json::json;

    fn new_image(id: &str) -> NewImage {
        NewImage {
            id: id.to_string(),
            filename: "page.png".to_string(),
            content_type: "image/png".to_string(),
            storage_key: format!("images/{}/page.png", id),
            file_size: 1024,
            natural_dimensions: Some(ImageDimensions::new(800, 600)),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let pool = test_pool().await;
        let repo = ImageRepository::new(&pool);

        let created = repo.create(&new_image("a")).await.unwrap();
        assert_eq!(created.status, ImageStatus::Pending);
        assert_eq!(created.natural_dimensions(), Some(ImageDimensions::new(800, 600)));
        assert_eq!(created.original_dimensions(), None);
        assert!(created.raw_response.is_none());

        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_and_raw_response() {
        let pool = test_pool().await;
        let repo = ImageRepository::new(&pool);
        repo.create(&new_image("a")).await.unwrap();

        assert!(repo.set_status("a", ImageStatus::Processing, None).await.unwrap());
        let raw = json!({"errorsAndCorrections": []});
        repo.set_status("a", ImageStatus::Completed, Some(&raw)).await.unwrap();

        let image = repo.get("a").await.unwrap().unwrap();
        assert_eq!(image.status, ImageStatus::Completed);
        assert_eq!(image.raw_response.map(|j| j.0), Some(raw));

        assert!(!repo.set_status("missing", ImageStatus::Failed, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_coordinate_frame_prefers_reported_dimensions() {
        let pool = test_pool().await;
        let repo = ImageRepository::new(&pool);
        repo.create(&new_image("a")).await.unwrap();
        repo.set_original_dimensions("a", 1600, 1200).await.unwrap();

        let image = repo.get("a").await.unwrap().unwrap();
        assert_eq!(image.coordinate_frame(), Some(ImageDimensions::new(1600, 1200)));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let pool = test_pool().await;
        let repo = ImageRepository::new(&pool);
        repo.create(&new_image("a")).await.unwrap();
        repo.create(&new_image("b")).await.unwrap();

        let ids: Vec<String> = repo.list().await.unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);

        assert!(repo.delete("a").await.unwrap());
        assert!(!repo.delete("a").await.unwrap());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
