//! becore - content catalog backend

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use becore::{
    api::{self, AppState},
    config::Config,
    db,
    storage,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "becore=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting becore...");

    // Load configuration
    let config_path =
        std::env::var("BECORE_CONFIG").unwrap_or_else(|_| "config.yml".to_string());
    let config = Config::load_with_env(Path::new(&config_path))?;
    config.validate()?;
    tracing::info!("Configuration loaded from {}", config_path);

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    pool.ping().await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Object storage
    let store = storage::create_object_store(&config.storage)?;
    tracing::info!("Object storage ready: {:?}", config.storage.driver);

    let state = AppState::new(pool.clone(), store, &config);
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
