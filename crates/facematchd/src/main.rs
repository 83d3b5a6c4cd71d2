use anyhow::{Context, Result};
use facematch_core::OnnxExtractor;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;
mod error;
mod handlers;
mod server;
mod service;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facematchd starting");

    let config = config::Config::from_env();
    tracing::info!(
        addr = %config.bind_addr(),
        backend = config.store_backend.as_str(),
        store = %config.store_path.display(),
        models = %config.model_dir.display(),
        tolerance = config.tolerance,
        "configuration loaded"
    );

    let store = facematch_core::open_store(config.store_backend, &config.store_path)
        .context("failed to open face store")?;

    let model_dir = config.model_dir.clone();
    let extractor = tokio::task::spawn_blocking(move || OnnxExtractor::load(&model_dir))
        .await?
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    tracing::info!("models loaded");

    let engine = engine::spawn_engine(Box::new(extractor)).context("failed to spawn engine thread")?;
    let service = service::FaceService::new(engine, store, config.store_backend, config.tolerance);

    server::start_server(config, service).await
}
