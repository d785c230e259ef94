//! Shared application state for the Axum API server.

use std::sync::Arc;

use wabulk_backend::{BackendClient, HttpTransport};
use wabulk_common::config::AppConfig;
use wabulk_dispatcher::Transport;

use crate::jobs::JobRegistry;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub backend: Arc<BackendClient>,
    /// Used for every bulk job started through the API
    pub transport: Arc<dyn Transport>,
    pub jobs: JobRegistry,
}

impl AppState {
    pub fn new(config: AppConfig, backend: Arc<BackendClient>) -> Self {
        let transport = Arc::new(HttpTransport::new(backend.clone()));
        Self::with_transport(config, backend, transport)
    }

    pub fn with_transport(
        config: AppConfig,
        backend: Arc<BackendClient>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            backend,
            transport,
            jobs: JobRegistry::new(),
        }
    }
}
