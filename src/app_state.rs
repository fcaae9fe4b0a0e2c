//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::ws::RealtimeHub;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Real-time hub: registry, gate and broadcaster.
    pub hub: Arc<RealtimeHub>,
    /// Key required on ingestion endpoints, if configured.
    pub worker_api_key: Option<Arc<str>>,
}

impl AppState {
    /// Creates state around an existing hub.
    #[must_use]
    pub fn new(hub: Arc<RealtimeHub>, worker_api_key: Option<String>) -> Self {
        Self {
            hub,
            worker_api_key: worker_api_key.map(Arc::from),
        }
    }
}
