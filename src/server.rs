//! Relay server lifecycle.
//!
//! [`RealtimeServer::initialize`] binds the listener, starts serving the
//! `/ws` endpoint plus the REST routes, and starts the liveness monitor.
//! [`RealtimeServer::shutdown`] reverses all of it: the monitor is
//! cancelled, every connection receives close 1001, and the listener stops.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::ws::LivenessMonitor;
use crate::ws::handler::ws_handler;
use crate::ws::hub::{CLOSE_GOING_AWAY, RealtimeHub};

/// Builds the full router (WebSocket endpoint and REST routes) for `state`.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A running relay instance.
#[derive(Debug)]
pub struct RealtimeServer {
    hub: Arc<RealtimeHub>,
    local_addr: SocketAddr,
    monitor: Option<LivenessMonitor>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    serve_task: Option<JoinHandle<Result<(), std::io::Error>>>,
}

impl RealtimeServer {
    /// Binds `config.listen_addr` and starts serving.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if the listener cannot be bound.
    pub async fn initialize(config: &RelayConfig) -> Result<Self, RelayError> {
        let hub = Arc::new(RealtimeHub::from_config(config));
        let state = AppState::new(Arc::clone(&hub), config.worker_api_key.clone());
        let app = build_app(state);

        let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let serve_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let monitor = LivenessMonitor::spawn(Arc::clone(hub.registry()), config.heartbeat_interval());

        tracing::info!(
            addr = %local_addr,
            heartbeat_secs = config.heartbeat_interval_secs,
            "websocket server started"
        );

        Ok(Self {
            hub,
            local_addr,
            monitor: Some(monitor),
            shutdown_tx: Some(shutdown_tx),
            serve_task: Some(serve_task),
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The hub, for in-process producers calling `broadcast`.
    #[must_use]
    pub const fn hub(&self) -> &Arc<RealtimeHub> {
        &self.hub
    }

    /// Stops the monitor, closes every connection and stops the listener.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if the serve loop ended with an I/O
    /// error, or [`RelayError::Internal`] if it panicked.
    pub async fn shutdown(mut self) -> Result<(), RelayError> {
        self.stop_background();
        let closed = self.hub.close_all(CLOSE_GOING_AWAY, "Server shutting down");

        if let Some(task) = self.serve_task.take() {
            task.await
                .map_err(|e| RelayError::Internal(format!("serve task failed: {e}")))??;
        }
        tracing::info!(closed, "websocket server shutdown");
        Ok(())
    }

    fn stop_background(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for RealtimeServer {
    fn drop(&mut self) {
        self.stop_background();
        if let Some(task) = self.serve_task.take() {
            task.abort();
        }
    }
}
