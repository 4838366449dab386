//! Inkcheck Server Library
//!
//! Uploads pictures of text to an external analysis webhook, stores the
//! detected errors and projects them onto the displayed image.
//!
//! # Modules
//!
//! - `analysis`: webhook client, response normalization, coordinate parsing
//! - `overlay`: projection of findings into display space
//! - `db`: SQLite persistence for images and findings
//! - `storage`: local and S3-compatible object storage
//! - `routes`: HTTP API

pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod overlay;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_bytes = state.config().upload.max_bytes;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/health", get(routes::health::health_check))
        .nest("/api/v1/webhook", routes::webhook::router())
        .nest("/api/v1/images", routes::images::router(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
