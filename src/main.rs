//! Inkcheck Server
//!
//! Image proofreading service: uploads go to an n8n analysis workflow and
//! the detected text errors come back as overlay boxes.

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inkcheck_server::config::Config;
use inkcheck_server::state::AppState;
use inkcheck_server::{app, db, storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "inkcheck_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Inkcheck Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Storage provider: {:?}", config.storage.provider);

    let image_storage = storage::from_config(&config.storage)
        .await
        .context("Failed to initialize image storage")?;

    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    let host = config.server.host.clone();
    let port = config.server.port;

    let app_state = AppState::new(config, db_pool, image_storage);
    let app = app(app_state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    tracing::info!("Inkcheck Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
