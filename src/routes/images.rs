//! Image API endpoints
//!
//! - Upload an image and run analysis on it
//! - List images, get one with its findings
//! - Download the original file
//! - Retry analysis
//! - Project findings into display space for the overlay
//! - Delete an image

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{AnalysisOutcome, Category, ImageDimensions, ImageUpload};
use crate::db::{
    AnalysisStore, ErrorRepository, ImageRecord, ImageRepository, ImageStatus, ImageWithErrors,
    NewImage, SqliteStore,
};
use crate::error::{AppError, Result};
use crate::overlay::{project, DisplayGeometry, Projection};
use crate::state::AppState;
use crate::storage::storage_key;
use crate::upload::validate_upload;

/// Room for multipart framing on top of the image itself
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Multipart field carrying the image
const IMAGE_FIELD: &str = "image";

/// Image with findings plus the result of the analysis that just ran
#[derive(Serialize)]
pub struct AnalyzedImageResponse {
    #[serde(flatten)]
    pub image: ImageWithErrors,
    pub analysis: AnalysisOutcome,
}

#[derive(Serialize)]
pub struct ImageListResponse {
    pub images: Vec<ImageRecord>,
    pub total: usize,
}

/// Overlay query: the size the image is displayed at, and optionally the
/// natural size the browser decoded
#[derive(Debug, Deserialize)]
pub struct OverlayQuery {
    pub displayed_width: f64,
    pub displayed_height: f64,
    pub natural_width: Option<u32>,
    pub natural_height: Option<u32>,
}

#[derive(Serialize)]
pub struct OverlayResponse {
    pub image_id: String,
    pub status: ImageStatus,
    pub original_width: Option<u32>,
    pub original_height: Option<u32>,
    pub displayed_width: f64,
    pub displayed_height: f64,
    pub boxes: Vec<OverlayBox>,
}

#[derive(Serialize)]
pub struct OverlayBox {
    pub error_id: String,
    pub category: Category,
    pub label: &'static str,
    pub original_text: Option<String>,
    pub corrected_text: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub projection: Projection,
}

/// Create the images router
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(list_images).post(upload_image))
        .route("/:id", get(get_image).delete(delete_image))
        .route("/:id/file", get(get_image_file))
        .route("/:id/analyze", post(analyze_image))
        .route("/:id/overlay", get(get_overlay))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD))
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Image not found: {}", id))
}

async fn find_image(state: &AppState, id: &str) -> Result<ImageRecord> {
    ImageRepository::new(state.db())
        .get(id)
        .await?
        .ok_or_else(|| not_found(id))
}

async fn load_with_errors(state: &AppState, id: &str) -> Result<ImageWithErrors> {
    SqliteStore::new(state.db().clone())
        .get_image_with_errors(id)
        .await?
        .ok_or_else(|| not_found(id))
}

/// Upload an image and analyze it
async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AnalyzedImageResponse>)> {
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            tracing::debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = field.content_type().map(|s| s.to_string());
        let data = field.bytes().await?;

        file = Some((filename, content_type, data));
        break;
    }

    let Some((filename, content_type, data)) = file else {
        return Err(AppError::BadRequest(format!(
            "No image provided. Use field name '{}'",
            IMAGE_FIELD
        )));
    };

    let validated = validate_upload(
        &filename,
        content_type.as_deref(),
        &data,
        state.config().upload.max_bytes,
    )?;

    let image_id = Uuid::new_v4().to_string();
    let key = storage_key(&image_id, &validated.filename);
    state
        .storage()
        .put(&key, &data, &validated.content_type)
        .await?;

    let created = ImageRepository::new(state.db())
        .create(&NewImage {
            id: image_id.clone(),
            filename: validated.filename.clone(),
            content_type: validated.content_type.clone(),
            storage_key: key.clone(),
            file_size: data.len() as i64,
            natural_dimensions: validated.natural_dimensions,
        })
        .await;

    if let Err(e) = created {
        if let Err(cleanup) = state.storage().delete(&key).await {
            tracing::warn!(key = %key, "Failed to remove orphaned upload: {}", cleanup);
        }
        return Err(e);
    }

    tracing::info!(
        image_id = %image_id,
        filename = %validated.filename,
        bytes = data.len(),
        storage = state.storage().name(),
        "Image uploaded"
    );

    let upload = ImageUpload {
        image_id,
        filename: validated.filename,
        content_type: validated.content_type,
        bytes: data.to_vec(),
        natural_dimensions: validated.natural_dimensions,
    };
    let analysis = state.submitter().submit(&upload).await?;
    let image = load_with_errors(&state, &upload.image_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(AnalyzedImageResponse { image, analysis }),
    ))
}

/// List all images, newest first
async fn list_images(State(state): State<AppState>) -> Result<Json<ImageListResponse>> {
    let images = ImageRepository::new(state.db()).list().await?;
    let total = images.len();

    Ok(Json(ImageListResponse { images, total }))
}

/// Get an image with its findings
async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ImageWithErrors>> {
    Ok(Json(load_with_errors(&state, &id).await?))
}

/// Download the original image bytes
async fn get_image_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let record = find_image(&state, &id).await?;
    let stored = state.storage().get(&record.storage_key).await?;

    Ok((
        [
            (header::CONTENT_TYPE, record.content_type),
            (header::CACHE_CONTROL, "private, max-age=3600".to_string()),
        ],
        stored.data,
    )
        .into_response())
}

/// Re-run analysis. New findings are appended to any previous ones.
async fn analyze_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnalyzedImageResponse>> {
    let record = find_image(&state, &id).await?;
    let stored = state.storage().get(&record.storage_key).await?;

    tracing::info!(image_id = %id, status = ?record.status, "Retrying analysis");

    let upload = ImageUpload {
        image_id: record.id.clone(),
        filename: record.filename.clone(),
        content_type: record.content_type.clone(),
        bytes: stored.data,
        natural_dimensions: record.natural_dimensions(),
    };
    let analysis = state.submitter().submit(&upload).await?;
    let image = load_with_errors(&state, &id).await?;

    Ok(Json(AnalyzedImageResponse { image, analysis }))
}

/// Project every finding into display space
async fn get_overlay(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OverlayQuery>,
) -> Result<Json<OverlayResponse>> {
    let record = find_image(&state, &id).await?;
    let errors = ErrorRepository::new(state.db()).list_for_image(&id).await?;

    let browser_natural = match (query.natural_width, query.natural_height) {
        (Some(width), Some(height)) => Some(ImageDimensions::new(width, height)),
        _ => None,
    };
    let frame = record.coordinate_frame().or(browser_natural);

    let boxes = errors
        .into_iter()
        .map(|error| {
            // Each finding is scaled from the frame it was parsed against
            let geometry = display_geometry(&query, error.frame().or(frame));
            OverlayBox {
                projection: project(&error.rect(), &geometry),
                label: error.category.label(),
                error_id: error.id,
                category: error.category,
                original_text: error.original_text,
                corrected_text: error.corrected_text,
                description: error.description,
            }
        })
        .collect();

    Ok(Json(OverlayResponse {
        image_id: record.id,
        status: record.status,
        original_width: frame.map(|d| d.width),
        original_height: frame.map(|d| d.height),
        displayed_width: query.displayed_width,
        displayed_height: query.displayed_height,
        boxes,
    }))
}

/// Unknown frame leaves the geometry unready, so the box is hidden
fn display_geometry(query: &OverlayQuery, frame: Option<ImageDimensions>) -> DisplayGeometry {
    DisplayGeometry {
        displayed_width: query.displayed_width,
        displayed_height: query.displayed_height,
        original_width: frame.map(|d| d.width as f64).unwrap_or(0.0),
        original_height: frame.map(|d| d.height as f64).unwrap_or(0.0),
    }
}

/// Delete an image, its findings and the stored object
async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let record = find_image(&state, &id).await?;

    state.storage().delete(&record.storage_key).await?;
    ImageRepository::new(state.db()).delete(&id).await?;

    tracing::info!(image_id = %id, "Image deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisWebhook, MockWebhook};
    use crate::config::Config;
    use crate::db::test_pool;
    use crate::storage::LocalImageStorage;
    use axum::body::Body;
    use axum::http::Request;
    use image::{ImageFormat, RgbImage};
    use serde_json::{json, Value};
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "inkcheck-test-boundary";

    async fn test_app(webhook: Option<Arc<dyn AnalysisWebhook>>) -> (Router, TempDir) {
        test_app_with_fallback(webhook, true).await
    }

    async fn test_app_with_fallback(
        webhook: Option<Arc<dyn AnalysisWebhook>>,
        fallback_on_failure: bool,
    ) -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = LocalImageStorage::new(dir.path().to_path_buf()).await.unwrap();

        let mut config = Config::default();
        config.upload.max_bytes = 64 * 1024;
        config.webhook.fallback_on_failure = fallback_on_failure;

        let state = AppState::with_webhook(config, test_pool().await, Arc::new(storage), webhook);
        (crate::app(state), dir)
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::new(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn multipart(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/v1/images")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_upload_in_demo_mode_uses_mock_analysis() {
        let (app, _dir) = test_app(None).await;

        let (status, body) = send_json(&app, multipart("image", "page.png", "image/png", &png(40, 30))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], json!("completed"));
        assert_eq!(body["natural_width"], json!(40));
        assert_eq!(body["errors"].as_array().unwrap().len(), 5);
        assert_eq!(body["summary"]["spelling"], json!(1));
        assert_eq!(body["analysis"]["mock"], json!(true));
        assert_eq!(body["raw_response"]["reason"], json!("webhook not configured"));
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_type() {
        let (app, _dir) = test_app(None).await;

        let (status, body) = send_json(&app, multipart("image", "doc.pdf", "application/pdf", b"%PDF-1.7")).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["error"], json!("invalid_file_type"));
    }

    #[tokio::test]
    async fn test_upload_rejects_oversized_image() {
        let (app, _dir) = test_app(None).await;

        let data = vec![0u8; 64 * 1024 + 1];
        let (status, body) = send_json(&app, multipart("image", "big.png", "image/png", &data)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], json!("file_too_large"));
    }

    #[tokio::test]
    async fn test_upload_requires_image_field() {
        let (app, _dir) = test_app(None).await;

        let (status, body) = send_json(&app, multipart("file", "page.png", "image/png", &png(2, 2))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("bad_request"));
    }

    #[tokio::test]
    async fn test_image_lifecycle() {
        let (app, _dir) = test_app(None).await;
        let data = png(40, 30);

        let (_, created) = send_json(&app, multipart("image", "page.png", "image/png", &data)).await;
        let id = created["id"].as_str().unwrap().to_string();

        let (status, listed) = send_json(&app, request("GET", "/api/v1/images")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["total"], json!(1));

        let (status, fetched) = send_json(&app, request("GET", &format!("/api/v1/images/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["errors"].as_array().unwrap().len(), 5);

        let response = app
            .clone()
            .oneshot(request("GET", &format!("/api/v1/images/{}/file", id)))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.to_vec(), data);

        let (status, _) = send(&app, request("DELETE", &format!("/api/v1/images/{}", id))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send_json(&app, request("GET", &format!("/api/v1/images/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("not_found"));
    }

    #[tokio::test]
    async fn test_overlay_projects_into_display_space() {
        let (app, _dir) = test_app(None).await;

        let (_, created) = send_json(&app, multipart("image", "page.png", "image/png", &png(400, 200))).await;
        let id = created["id"].as_str().unwrap();

        let uri = format!("/api/v1/images/{}/overlay?displayed_width=200&displayed_height=100", id);
        let (status, overlay) = send_json(&app, request("GET", &uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(overlay["original_width"], json!(400));

        let boxes = overlay["boxes"].as_array().unwrap();
        assert_eq!(boxes.len(), 5);
        for b in boxes {
            assert_eq!(b["visible"], json!(true));
            let right = b["left"].as_f64().unwrap() + b["width"].as_f64().unwrap();
            let bottom = b["top"].as_f64().unwrap() + b["height"].as_f64().unwrap();
            assert!(right <= 200.0 && bottom <= 100.0);
        }

        // Spelling mock box sits at 25% / 30%
        assert_eq!(boxes[0]["label"], json!("Spelling"));
        assert!((boxes[0]["left"].as_f64().unwrap() - 50.0).abs() < 1e-9);
        assert!((boxes[0]["top"].as_f64().unwrap() - 30.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_overlay_uses_fallback_frame_for_undecodable_upload() {
        let (app, _dir) = test_app(None).await;

        // Undecodable bytes leave the natural size unknown
        let (status, created) = send_json(&app, multipart("image", "page.png", "image/png", b"not a png")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["original_width"], json!(1920));
        let id = created["id"].as_str().unwrap();

        // No rendered size yet
        let uri = format!("/api/v1/images/{}/overlay?displayed_width=0&displayed_height=0", id);
        let (_, overlay) = send_json(&app, request("GET", &uri)).await;
        assert!(overlay["boxes"]
            .as_array()
            .unwrap()
            .iter()
            .all(|b| b["visible"] == json!(false)));

        let uri = format!("/api/v1/images/{}/overlay?displayed_width=960&displayed_height=540", id);
        let (_, overlay) = send_json(&app, request("GET", &uri)).await;
        assert_eq!(overlay["original_height"], json!(1080));
        let boxes = overlay["boxes"].as_array().unwrap();
        assert!(boxes.iter().all(|b| b["visible"] == json!(true)));
        assert!((boxes[0]["left"].as_f64().unwrap() - 240.0).abs() < 1e-9);
    }

    fn punctuation_reply(width: u32, height: u32) -> Value {
        json!({
            "errorsAndCorrections": [{
                "error_type": "Punctuation",
                "found_text": "Hello world",
                "corrected_text": "Hello, world",
                "Coordinates": {"x": 40, "y": 40, "width": 100, "height": 50}
            }],
            "image_dimensions": {"width": width, "height": height}
        })
    }

    #[tokio::test]
    async fn test_retry_appends_findings_in_its_own_frame() {
        let webhook = Arc::new(MockWebhook::replying(Ok(punctuation_reply(1000, 500))));
        let (app, _dir) = test_app(Some(webhook.clone())).await;

        let (_, created) = send_json(&app, multipart("image", "page.png", "image/png", &png(400, 200))).await;
        assert_eq!(created["analysis"]["mock"], json!(false));
        assert_eq!(created["original_width"], json!(1000));
        assert_eq!(created["errors"].as_array().unwrap().len(), 1);
        assert_eq!(created["errors"][0]["category"], json!("grammatical"));
        let id = created["id"].as_str().unwrap();

        // The scripted reply is used up, so the retry fails and falls back
        let (status, retried) = send_json(&app, request("POST", &format!("/api/v1/images/{}/analyze", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(retried["analysis"]["mock"], json!(true));
        assert_eq!(retried["errors"].as_array().unwrap().len(), 6);
        assert_eq!(retried["original_width"], json!(400));
        assert_eq!(webhook.calls.load(std::sync::atomic::Ordering::SeqCst), 2);

        let uri = format!("/api/v1/images/{}/overlay?displayed_width=400&displayed_height=200", id);
        let (_, overlay) = send_json(&app, request("GET", &uri)).await;
        assert_eq!(overlay["original_width"], json!(400));
        let boxes = overlay["boxes"].as_array().unwrap();
        let spelling = boxes.iter().find(|b| b["label"] == json!("Spelling")).unwrap();
        // Mock spelling box sits at 25% of the width
        assert!((spelling["left"].as_f64().unwrap() - 100.0).abs() < 1e-9);

        // The live finding keeps its 1000x500 frame
        let live = boxes
            .iter()
            .find(|b| b["original_text"] == json!("Hello world"))
            .unwrap();
        assert!((live["left"].as_f64().unwrap() - 16.0).abs() < 1e-9);
        assert!((live["width"].as_f64().unwrap() - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_retry_keeps_previous_findings() {
        let webhook = Arc::new(MockWebhook::replying(Ok(punctuation_reply(400, 200))));
        let (app, _dir) = test_app_with_fallback(Some(webhook), false).await;

        let (_, created) = send_json(&app, multipart("image", "page.png", "image/png", &png(400, 200))).await;
        assert_eq!(created["status"], json!("completed"));
        assert_eq!(created["errors"].as_array().unwrap().len(), 1);
        let id = created["id"].as_str().unwrap();

        let (status, retried) = send_json(&app, request("POST", &format!("/api/v1/images/{}/analyze", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(retried["status"], json!("failed"));
        assert_eq!(retried["analysis"]["mock"], json!(false));
        let errors = retried["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["original_text"], json!("Hello world"));
    }

    #[tokio::test]
    async fn test_unknown_image_is_not_found() {
        let (app, _dir) = test_app(None).await;

        for (method, uri) in [
            ("GET", "/api/v1/images/missing"),
            ("GET", "/api/v1/images/missing/file"),
            ("POST", "/api/v1/images/missing/analyze"),
            ("GET", "/api/v1/images/missing/overlay?displayed_width=1&displayed_height=1"),
            ("DELETE", "/api/v1/images/missing"),
        ] {
            let (status, _) = send(&app, request(method, uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
        }
    }
}
