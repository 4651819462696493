use anyhow::Context;
use sentiment_core::{InferenceEngine, ModelRegistry, PredictionService};
use sentiment_server::{router, AppState, ServerConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    info!("Selected model: {}", config.model.model_id);

    // The process does not serve without a usable model
    info!("Loading model...");
    let registry = ModelRegistry::new(config.model.clone());
    let model = tokio::task::spawn_blocking(move || registry.load())
        .await
        .context("model loading task failed")?
        .context("failed to load model")?;

    let info = model.info();
    info!("Model loaded successfully!");
    info!("  Model: {}", info.model_id);
    info!("  Device: {}", info.device);
    info!("  Max length: {}", info.max_length);
    info!("  Labels: {}", info.num_labels);
    info!(
        "  Inference workers: {} (timeout {:?})",
        config.service.max_concurrency, config.service.request_timeout
    );

    let engine = InferenceEngine::new(Arc::new(model));
    let service = PredictionService::new(engine, config.service.clone());
    let app = router(AppState::new(service), &config.static_dir);

    let addr = config.bind_addr();
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
