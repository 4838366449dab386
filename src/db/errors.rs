//! Detected error database operations

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::analysis::{Category, ImageDimensions, NewDetectedError, Rect};
use crate::error::Result;

/// Persisted finding; coordinates are in the image's original pixel space
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DetectedError {
    pub id: String,
    pub image_id: String,
    pub category: Category,
    pub original_text: Option<String>,
    pub corrected_text: Option<String>,
    pub description: Option<String>,
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub frame_width: Option<i64>,
    pub frame_height: Option<i64>,
    pub created_at: String,
}

impl DetectedError {
    pub fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }

    /// Frame the rectangle was parsed against
    pub fn frame(&self) -> Option<ImageDimensions> {
        ImageDimensions::from_columns(self.frame_width, self.frame_height)
    }
}

/// Detected error repository
pub struct ErrorRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ErrorRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert all records in one transaction
    pub async fn insert_many(&self, records: &[NewDetectedError]) -> Result<Vec<DetectedError>> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(records.len());

        for record in records {
            let id = Uuid::new_v4().to_string();

            sqlx::query(
                r#"
                INSERT INTO detected_errors (id, image_id, category, original_text, corrected_text,
                                             description, x, y, width, height,
                                             frame_width, frame_height, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&record.image_id)
            .bind(record.category)
            .bind(&record.original_text)
            .bind(&record.corrected_text)
            .bind(&record.description)
            .bind(record.rect.x)
            .bind(record.rect.y)
            .bind(record.rect.width)
            .bind(record.rect.height)
            .bind(record.frame.width as i64)
            .bind(record.frame.height as i64)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            inserted.push(DetectedError {
                id,
                image_id: record.image_id.clone(),
                category: record.category,
                original_text: record.original_text.clone(),
                corrected_text: record.corrected_text.clone(),
                description: record.description.clone(),
                x: record.rect.x,
                y: record.rect.y,
                width: record.rect.width,
                height: record.rect.height,
                frame_width: Some(i64::from(record.frame.width)),
                frame_height: Some(i64::from(record.frame.height)),
                created_at: now.clone(),
            });
        }

        tx.commit().await?;

        Ok(inserted)
    }

    /// List findings for an image in insertion order
    pub async fn list_for_image(&self, image_id: &str) -> Result<Vec<DetectedError>> {
        let errors = sqlx::query_as::<_, DetectedError>(
            r#"
            SELECT id, image_id, category, original_text, corrected_text, description,
                   x, y, width, height, frame_width, frame_height, created_at
            FROM detected_errors
            WHERE image_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(image_id)
        .fetch_all(self.pool)
        .await?;

        Ok(errors)
    }
}

/// Per-category counts, every category present
pub fn summarize(errors: &[DetectedError]) -> BTreeMap<Category, usize> {
    let mut summary: BTreeMap<Category, usize> =
        Category::ALL.iter().map(|category| (*category, 0)).collect();
    for error in errors {
        *summary.entry(error.category).or_default() += 1;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, ImageRepository, NewImage};

    async fn seed_image(pool: &SqlitePool, id: &str) {
        ImageRepository::new(pool)
            .create(&NewImage {
                id: id.to_string(),
                filename: "scan.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                storage_key: format!("images/{}/scan.jpg", id),
                file_size: 10,
                natural_dimensions: None,
            })
            .await
            .unwrap();
    }

    fn record(image_id: &str, category: Category, rect: Rect) -> NewDetectedError {
        NewDetectedError {
            image_id: image_id.to_string(),
            category,
            original_text: Some("teh".to_string()),
            corrected_text: Some("the".to_string()),
            description: None,
            rect,
            frame: ImageDimensions::new(100, 50),
        }
    }

    #[tokio::test]
    async fn test_insert_many_preserves_order_and_points() {
        let pool = test_pool().await;
        seed_image(&pool, "img").await;
        let repo = ErrorRepository::new(&pool);

        let point = Rect {
            x: 4.0,
            y: 5.0,
            width: None,
            height: None,
        };
        let records = vec![
            record("img", Category::Spelling, Rect::zero()),
            record("img", Category::Space, point),
            record("img", Category::Spelling, Rect::zero()),
        ];
        let inserted = repo.insert_many(&records).await.unwrap();
        assert_eq!(inserted.len(), 3);

        let listed = repo.list_for_image("img").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|e| e.id.as_str()).collect();
        let expected: Vec<&str> = inserted.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, expected);
        assert!(listed[1].rect().is_point());
        assert_eq!(listed[1].category, Category::Space);
        assert_eq!(listed[0].frame(), Some(ImageDimensions::new(100, 50)));

        let summary = summarize(&listed);
        assert_eq!(summary[&Category::Spelling], 2);
        assert_eq!(summary[&Category::Space], 1);
        assert_eq!(summary[&Category::Context], 0);
    }

    #[tokio::test]
    async fn test_insert_many_is_all_or_nothing() {
        let pool = test_pool().await;
        seed_image(&pool, "img").await;
        let repo = ErrorRepository::new(&pool);

        // Second record violates the foreign key
        let records = vec![
            record("img", Category::Spelling, Rect::zero()),
            record("no-such-image", Category::Spelling, Rect::zero()),
        ];
        assert!(repo.insert_many(&records).await.is_err());
        assert!(repo.list_for_image("img").await.unwrap().is_empty());
    }
}
