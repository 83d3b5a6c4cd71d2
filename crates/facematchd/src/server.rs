//! Router assembly and server startup.

use crate::config::Config;
use crate::handlers;
use crate::service::FaceService;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the application router with every endpoint and middleware layer.
pub fn build_router(service: FaceService, config: &Config) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/status", get(handlers::status))
        .route("/upload", post(handlers::upload))
        .route("/recognize", post(handlers::recognize))
        .route("/match", post(handlers::match_embedding))
        .route("/known-faces", get(handlers::known_faces))
        .route("/recognize_realtime", post(handlers::recognize_realtime))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_allowed_origins))
                .layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .with_state(service)
}

/// An empty origin list allows any origin without credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Serve until Ctrl-C.
pub async fn start_server(config: Config, service: FaceService) -> Result<()> {
    let addr = config.bind_addr();
    let app = build_router(service, &config);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "facematchd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("facematchd shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
