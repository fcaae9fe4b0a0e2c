//! DTOs for event ingestion and connection introspection.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::ws::Delivery;

/// Response body for ingestion endpoints (202 Accepted).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResponse {
    /// Connections whose queue accepted the event.
    pub delivered: usize,
    /// Connections dropped because they could not keep up.
    pub dropped: usize,
}

impl From<Delivery> for DeliveryResponse {
    fn from(delivery: Delivery) -> Self {
        Self {
            delivered: delivery.delivered,
            dropped: delivery.dropped,
        }
    }
}

/// Request body for `POST /cameras/{cameraId}/stats`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatsRequest {
    /// Whether the camera stream is online.
    pub is_online: bool,
    /// Total alerts recorded for the camera.
    pub total_alerts: u64,
    /// Alerts recorded in the recent window.
    pub recent_alerts: u64,
}

/// Query parameters for `GET /realtime/connections`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ConnectionCountQuery {
    /// Also count connections for this owner.
    pub owner_id: Option<String>,
}

/// Response body for `GET /realtime/connections`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCountResponse {
    /// Total live connections.
    pub total: usize,
    /// Live connections for the requested owner, if one was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<usize>,
}
