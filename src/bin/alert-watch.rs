//! `alert-watch`: a terminal dashboard for the relay.
//!
//! Connects with `ACCESS_TOKEN`, subscribes to the comma-separated
//! `CAMERA_IDS` (all cameras when unset) and logs every event until Ctrl-C.

use alert_relay::client::{ClientConfig, ConnectionManager, ConnectionState};
use alert_relay::ws::ServerMessage;
use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    alert_relay::logging::init();
    let _ = dotenvy::dotenv();

    let config = ClientConfig::from_env().context("invalid client configuration")?;
    let token = std::env::var("ACCESS_TOKEN").context("ACCESS_TOKEN must be set")?;
    let cameras: Vec<String> = std::env::var("CAMERA_IDS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    tracing::info!(endpoint = %config.endpoint, cameras = ?cameras, "starting alert-watch");
    let manager = ConnectionManager::new(config);

    let _messages = manager.on_message(|message| match message {
        ServerMessage::Connected(notice) => {
            tracing::info!(client_id = %notice.client_id, "{}", notice.message);
        }
        ServerMessage::AlertCreated(alert) => {
            tracing::info!(
                camera_id = %alert.camera_id,
                camera = %alert.camera_name,
                location = %alert.location,
                faces = alert.face_count,
                confidence = alert.confidence,
                "alert"
            );
        }
        ServerMessage::CameraStats(stats) => {
            tracing::info!(
                camera_id = %stats.camera_id,
                online = stats.is_online,
                total = stats.total_alerts,
                recent = stats.recent_alerts,
                "camera stats"
            );
        }
        ServerMessage::Ping | ServerMessage::Pong => {}
    });
    let _closes = manager.on_close(|info| {
        tracing::warn!(code = ?info.code, reason = %info.reason, "connection closed");
    });

    for camera in cameras {
        manager.subscribe_to_camera(camera);
    }
    manager.connect(token);

    let mut states = manager.state_changes();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                if *states.borrow_and_update() == ConnectionState::GivenUp {
                    anyhow::bail!("gave up reconnecting to the relay");
                }
            }
        }
    }

    manager.disconnect();
    Ok(())
}
