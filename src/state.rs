//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::analysis::{AnalysisSubmitter, AnalysisWebhook, N8nWebhook};
use crate::config::Config;
use crate::db::SqliteStore;
use crate::storage::ImageStorage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    storage: Arc<dyn ImageStorage>,
    submitter: AnalysisSubmitter,
}

impl AppState {
    /// Create state, wiring the live webhook when a URL is configured
    pub fn new(config: Config, db: SqlitePool, storage: Arc<dyn ImageStorage>) -> Self {
        let webhook: Option<Arc<dyn AnalysisWebhook>> = match config.webhook.live_url() {
            Some(url) => {
                tracing::info!(url = %url, timeout = ?config.webhook.timeout(), "Analysis webhook configured");
                Some(Arc::new(N8nWebhook::new(url, config.webhook.timeout())))
            }
            None => {
                tracing::warn!("N8N_WEBHOOK_URL not configured, running in demo mode with mock analysis");
                None
            }
        };

        Self::with_webhook(config, db, storage, webhook)
    }

    /// Create state with an explicit webhook (`None` = demo mode)
    pub fn with_webhook(
        config: Config,
        db: SqlitePool,
        storage: Arc<dyn ImageStorage>,
        webhook: Option<Arc<dyn AnalysisWebhook>>,
    ) -> Self {
        let submitter = AnalysisSubmitter::new(
            Arc::new(SqliteStore::new(db.clone())),
            webhook,
            config.webhook.fallback_on_failure,
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                storage,
                submitter,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the image storage backend
    pub fn storage(&self) -> &dyn ImageStorage {
        self.inner.storage.as_ref()
    }

    /// Get the analysis submitter
    pub fn submitter(&self) -> &AnalysisSubmitter {
        &self.inner.submitter
    }
}
