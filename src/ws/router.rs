//! Applies inbound control frames to a connection's subscription state.
//!
//! Routing never closes a connection: unknown discriminators are ignored
//! for forward compatibility and unparseable payloads are dropped.

use serde_json::Value;

use super::connection::Connection;
use super::messages::{ClientCommand, ServerMessage};
use crate::domain::CameraId;

/// Result of routing one inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// `SUBSCRIBE_CAMERA` applied; `added` is `false` for a repeat.
    Subscribed {
        /// Camera added to the filter.
        camera_id: CameraId,
        /// Whether the set changed.
        added: bool,
    },
    /// `UNSUBSCRIBE_CAMERA` applied; `removed` is `false` when absent.
    Unsubscribed {
        /// Camera removed from the filter.
        camera_id: CameraId,
        /// Whether the set changed.
        removed: bool,
    },
    /// `PING` received; a `PONG` must be sent back.
    Pong,
    /// Well-formed frame with a discriminator this server does not know.
    Unknown(String),
    /// Frame that could not be parsed; nothing was applied.
    Malformed(String),
}

impl RouteOutcome {
    /// Returns the frame to send back to the same connection, if any.
    #[must_use]
    pub fn reply(&self) -> Option<ServerMessage> {
        match self {
            Self::Pong => Some(ServerMessage::Pong),
            _ => None,
        }
    }
}

/// Parses `text` and applies it to `conn`.
pub fn route(conn: &Connection, text: &str) -> RouteOutcome {
    let outcome = match parse(text) {
        Ok(ClientCommand::SubscribeCamera { camera_id }) => {
            let added = conn.subscribe(camera_id.clone());
            tracing::info!(connection_id = %conn.id(), camera_id = %camera_id, "client subscribed to camera");
            RouteOutcome::Subscribed { camera_id, added }
        }
        Ok(ClientCommand::UnsubscribeCamera { camera_id }) => {
            let removed = conn.unsubscribe(&camera_id);
            tracing::info!(connection_id = %conn.id(), camera_id = %camera_id, "client unsubscribed from camera");
            RouteOutcome::Unsubscribed {
                camera_id,
                removed,
            }
        }
        Ok(ClientCommand::Ping) => RouteOutcome::Pong,
        Err(outcome) => outcome,
    };

    match &outcome {
        RouteOutcome::Unknown(kind) => {
            tracing::warn!(connection_id = %conn.id(), message_type = %kind, "unknown message type");
        }
        RouteOutcome::Malformed(reason) => {
            tracing::warn!(connection_id = %conn.id(), error = %reason, "malformed websocket message");
        }
        _ => {}
    }
    outcome
}

fn parse(text: &str) -> Result<ClientCommand, RouteOutcome> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| RouteOutcome::Malformed(e.to_string()))?;
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(RouteOutcome::Malformed("missing `type` field".to_string()));
    };
    if !ClientCommand::KNOWN_TYPES.contains(&kind) {
        return Err(RouteOutcome::Unknown(kind.to_string()));
    }
    let command: ClientCommand =
        serde_json::from_value(value).map_err(|e| RouteOutcome::Malformed(e.to_string()))?;
    match &command {
        ClientCommand::SubscribeCamera { camera_id }
        | ClientCommand::UnsubscribeCamera { camera_id }
            if camera_id.as_str().trim().is_empty() =>
        {
            Err(RouteOutcome::Malformed("empty `cameraId`".to_string()))
        }
        _ => Ok(command),
    }
}
