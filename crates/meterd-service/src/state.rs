//! Application state.

use std::sync::Arc;

use meterd_engine::Engine;
use meterd_store::RocksStore;

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The entitlement engine.
    pub engine: Arc<Engine<RocksStore>>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not configured - usage ingestion will reject all requests");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not configured - mutations will reject all requests");
        }

        Self {
            engine: Arc::new(Engine::new(store)),
            config,
        }
    }
}
