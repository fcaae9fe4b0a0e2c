//! Wire message types exchanged over the real-time channel.
//!
//! Every frame is a JSON object with a required `type` discriminator.
//! Server → client frames carry their body under `data`; client → server
//! control frames carry their fields inline:
//!
//! ```text
//! {"type":"CONNECTED","data":{"clientId":"u1_1700000000000","message":"..."}}
//! {"type":"ALERT_CREATED","data":{"id":"...","cameraId":"cam-1",...}}
//! {"type":"CAMERA_STATS","data":{"cameraId":"cam-1","isOnline":true,...}}
//! {"type":"SUBSCRIBE_CAMERA","cameraId":"cam-1"}
//! {"type":"UNSUBSCRIBE_CAMERA","cameraId":"cam-1"}
//! {"type":"PING"} / {"type":"PONG"}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{AlertNotice, CameraId, CameraStatsNotice};

/// Body of the welcome frame sent right after admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedNotice {
    /// Server-assigned connection id.
    pub client_id: String,
    /// Human-readable greeting.
    pub message: String,
}

/// Event delivered from the server to dashboards.
///
/// Immutable once constructed; the broadcaster serializes each value
/// exactly once regardless of recipient count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Welcome frame for a freshly admitted connection.
    Connected(ConnectedNotice),
    /// A new alert was persisted.
    AlertCreated(AlertNotice),
    /// Updated per-camera statistics.
    CameraStats(CameraStatsNotice),
    /// Application-level ping.
    Ping,
    /// Application-level reply to a client `PING`.
    Pong,
}

impl ServerMessage {
    /// Returns the camera this event concerns, if any.
    ///
    /// Events without a camera (protocol frames) pass every subscription
    /// filter.
    #[must_use]
    pub fn camera_id(&self) -> Option<&CameraId> {
        match self {
            Self::AlertCreated(alert) => Some(&alert.camera_id),
            Self::CameraStats(stats) => Some(&stats.camera_id),
            Self::Connected(_) | Self::Ping | Self::Pong => None,
        }
    }

    /// Returns the wire discriminator as a static string slice.
    #[must_use]
    pub const fn type_str(&self) -> &'static str {
        match self {
            Self::Connected(_) => "CONNECTED",
            Self::AlertCreated(_) => "ALERT_CREATED",
            Self::CameraStats(_) => "CAMERA_STATS",
            Self::Ping => "PING",
            Self::Pong => "PONG",
        }
    }
}

/// Control frame sent by a dashboard to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    /// Start receiving events for a camera.
    SubscribeCamera {
        /// Camera to add to the connection's filter.
        #[serde(rename = "cameraId")]
        camera_id: CameraId,
    },
    /// Stop receiving events for a camera.
    UnsubscribeCamera {
        /// Camera to remove from the connection's filter.
        #[serde(rename = "cameraId")]
        camera_id: CameraId,
    },
    /// Keepalive; answered with [`ServerMessage::Pong`].
    Ping,
}

impl ClientCommand {
    /// Discriminators this server understands.
    pub const KNOWN_TYPES: [&'static str; 3] = ["SUBSCRIBE_CAMERA", "UNSUBSCRIBE_CAMERA", "PING"];
}
