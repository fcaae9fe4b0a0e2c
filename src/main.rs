//! alert-relay server entry point.
//!
//! Serves the `/ws` real-time endpoint and the REST ingestion routes until
//! Ctrl-C, then shuts down gracefully.

use alert_relay::config::RelayConfig;
use alert_relay::server::RealtimeServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    alert_relay::logging::init();

    // Load configuration
    let config = RelayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting alert-relay");

    let server = RealtimeServer::initialize(&config).await?;
    tracing::info!(addr = %server.local_addr(), "server listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    server.shutdown().await?;
    Ok(())
}
