//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Uploaded images and their analysis state
CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    content_type TEXT NOT NULL,
    storage_key TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    -- 'pending' | 'processing' | 'completed' | 'failed'
    status TEXT NOT NULL DEFAULT 'pending',
    -- Untouched webhook payload (JSON), kept for audit
    raw_response TEXT,
    -- Frame reported by the analysis service
    original_width INTEGER,
    original_height INTEGER,
    -- Frame decoded from the uploaded file
    natural_width INTEGER,
    natural_height INTEGER,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_images_status ON images(status);
CREATE INDEX IF NOT EXISTS idx_images_created_at ON images(created_at);

-- Findings, in original pixel space; width/height NULL for point findings
CREATE TABLE IF NOT EXISTS detected_errors (
    id TEXT PRIMARY KEY,
    image_id TEXT NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    category TEXT NOT NULL,
    original_text TEXT,
    corrected_text TEXT,
    description TEXT,
    x REAL NOT NULL DEFAULT 0,
    y REAL NOT NULL DEFAULT 0,
    width REAL,
    height REAL,
    -- Frame x/y/width/height were parsed against
    frame_width INTEGER,
    frame_height INTEGER,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_detected_errors_image_id ON detected_errors(image_id);
CREATE INDEX IF NOT EXISTS idx_detected_errors_category ON detected_errors(category);
"#;
