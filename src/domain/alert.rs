//! Alert payload records carried by real-time events.
//!
//! These are the `data` bodies of the `ALERT_CREATED` and `CAMERA_STATS`
//! wire messages. They are built by the alert-producing pipeline after the
//! record has been persisted, and are never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::CameraId;

/// A face-detection alert raised by a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotice {
    /// Alert record identifier.
    pub id: String,
    /// Camera that raised the alert.
    #[schema(value_type = String)]
    pub camera_id: CameraId,
    /// Human-readable camera name (`"Unknown"` when the camera was deleted).
    pub camera_name: String,
    /// Camera location label.
    pub location: String,
    /// Number of faces detected in the frame.
    pub face_count: u32,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    /// Snapshot image URL, if one was stored.
    pub snapshot_url: Option<String>,
    /// When the alert record was created (ISO-8601 on the wire).
    pub timestamp: DateTime<Utc>,
}

/// Aggregated per-camera statistics pushed to dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatsNotice {
    /// Camera the statistics describe.
    #[schema(value_type = String)]
    pub camera_id: CameraId,
    /// Whether the camera stream is currently online.
    pub is_online: bool,
    /// Total alerts recorded for the camera.
    pub total_alerts: u64,
    /// Alerts recorded in the recent window.
    pub recent_alerts: u64,
}
