//! Analysis webhook status

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Whether uploads are analyzed by the live webhook or the mock set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookMode {
    Live,
    Demo,
}

#[derive(Serialize)]
pub struct WebhookStatusResponse {
    pub mode: WebhookMode,
    pub fallback_on_failure: bool,
    pub timeout_secs: u64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(webhook_status))
}

async fn webhook_status(State(state): State<AppState>) -> Json<WebhookStatusResponse> {
    let submitter = state.submitter();

    Json(WebhookStatusResponse {
        mode: if submitter.is_live() {
            WebhookMode::Live
        } else {
            WebhookMode::Demo
        },
        fallback_on_failure: submitter.fallback_on_failure(),
        timeout_secs: state.config().webhook.timeout_secs,
    })
}
