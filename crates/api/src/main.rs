//! wabulk API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use wabulk_backend::BackendClient;
use wabulk_common::config::AppConfig;

use wabulk_api::routes::create_router;
use wabulk_api::state::AppState;

/// A 16 MiB media file after base64 encoding, plus the recipient list.
const MAX_BODY_BYTES: usize = 24 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "wabulk_api=debug,wabulk_dispatcher=debug,wabulk_backend=debug,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting wabulk API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    let backend = Arc::new(BackendClient::new(
        &config.backend_api_url,
        config.backend_timeout(),
    )?);
    tracing::info!(backend = %backend.base_url(), "Backend client ready");

    // Build application state
    let addr: SocketAddr = config.api_bind_addr.parse()?;
    let state = AppState::new(config, backend);

    // Build router
    let app = create_router(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
