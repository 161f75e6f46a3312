//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        build_provider_registry, gemini, openai, DbAdapter, LocalDocumentStore, PdfTextAdapter,
    },
    config::Config,
    error::ApiError,
    web::{build_router, AppState},
};
use invoice_extraction_core::orchestrator::ExtractionOrchestrator;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let documents = Arc::new(LocalDocumentStore::new(config.upload_dir.clone()));
    documents.ensure_dir().await?;
    info!(upload_dir = %documents.root().display(), "Document store ready");

    let registry = build_provider_registry(&config, Arc::new(PdfTextAdapter::new()));
    for name in registry.names() {
        let configured = match name.as_str() {
            openai::PROVIDER_NAME => config.openai_api_key.is_some(),
            gemini::PROVIDER_NAME => config.gemini_api_key.is_some(),
            _ => true,
        };
        if !configured {
            warn!(provider = %name, "No API key configured; requests for this provider will fail");
        }
    }
    info!(
        default_provider = %registry.default_provider(),
        providers = ?registry.names(),
        "Extraction providers registered"
    );

    // --- 4. Build the Orchestrator and the Shared AppState ---
    let orchestrator = ExtractionOrchestrator::new(db_adapter, documents, Arc::new(registry))
        .with_provider_timeout(config.extraction_timeout);
    let app_state = Arc::new(AppState::new(Arc::new(orchestrator), config.clone()));

    // --- 5. Create the Web Router ---
    let app = build_router(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
