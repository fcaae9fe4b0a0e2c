//! Event ingestion and connection introspection handlers.
//!
//! The alert pipeline calls these after it has persisted a record; the
//! relay itself stores nothing.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CameraStatsRequest, ConnectionCountQuery, ConnectionCountResponse, DeliveryResponse,
};
use crate::app_state::AppState;
use crate::domain::{AlertNotice, CameraId, CameraStatsNotice};
use crate::error::{ErrorResponse, RelayError};
use crate::ws::ServerMessage;

/// Header carrying the worker API key.
pub const WORKER_API_KEY_HEADER: &str = "X-Backend-Worker-API-Key";

/// `POST /alerts`: Broadcast a freshly persisted alert.
///
/// # Errors
///
/// Returns [`RelayError::Unauthorized`] on a missing or wrong worker key
/// and [`RelayError::InvalidRequest`] on an invalid payload.
#[utoipa::path(
    post,
    path = "/api/v1/alerts",
    tag = "Realtime",
    summary = "Broadcast an alert",
    description = "Pushes an ALERT_CREATED event to every dashboard whose subscription set is empty or contains the alert's camera.",
    request_body = AlertNotice,
    responses(
        (status = 202, description = "Event fanned out", body = DeliveryResponse),
        (status = 400, description = "Invalid alert payload", body = ErrorResponse),
        (status = 401, description = "Missing or wrong worker key", body = ErrorResponse),
    )
)]
pub async fn publish_alert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(alert): Json<AlertNotice>,
) -> Result<impl IntoResponse, RelayError> {
    require_worker(&state, &headers)?;
    validate_alert(&alert)?;

    let delivery = state.hub.broadcast(&ServerMessage::AlertCreated(alert))?;
    Ok((StatusCode::ACCEPTED, Json(DeliveryResponse::from(delivery))))
}

/// `POST /cameras/{cameraId}/stats`: Broadcast camera statistics.
///
/// # Errors
///
/// Returns [`RelayError::Unauthorized`] on a missing or wrong worker key
/// and [`RelayError::InvalidRequest`] on an empty camera id.
#[utoipa::path(
    post,
    path = "/api/v1/cameras/{cameraId}/stats",
    tag = "Realtime",
    summary = "Broadcast camera statistics",
    description = "Pushes a CAMERA_STATS event, filtered by camera subscription like alerts.",
    params(("cameraId" = String, Path, description = "Camera identifier")),
    request_body = CameraStatsRequest,
    responses(
        (status = 202, description = "Event fanned out", body = DeliveryResponse),
        (status = 401, description = "Missing or wrong worker key", body = ErrorResponse),
    )
)]
pub async fn publish_camera_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(camera_id): Path<String>,
    Json(req): Json<CameraStatsRequest>,
) -> Result<impl IntoResponse, RelayError> {
    require_worker(&state, &headers)?;
    if camera_id.trim().is_empty() {
        return Err(RelayError::InvalidRequest(
            "cameraId must not be empty".to_string(),
        ));
    }

    let stats = CameraStatsNotice {
        camera_id: CameraId::new(camera_id),
        is_online: req.is_online,
        total_alerts: req.total_alerts,
        recent_alerts: req.recent_alerts,
    };
    let delivery = state.hub.broadcast(&ServerMessage::CameraStats(stats))?;
    Ok((StatusCode::ACCEPTED, Json(DeliveryResponse::from(delivery))))
}

/// `GET /realtime/connections`: Live connection counts.
#[utoipa::path(
    get,
    path = "/api/v1/realtime/connections",
    tag = "Realtime",
    summary = "Count live connections",
    description = "Returns the number of live WebSocket connections, optionally also for one owner.",
    params(ConnectionCountQuery),
    responses(
        (status = 200, description = "Connection counts", body = ConnectionCountResponse),
    )
)]
pub async fn connection_counts(
    State(state): State<AppState>,
    Query(query): Query<ConnectionCountQuery>,
) -> impl IntoResponse {
    Json(ConnectionCountResponse {
        total: state.hub.count_all(),
        owner: query
            .owner_id
            .as_deref()
            .map(|owner| state.hub.count_by_owner(owner)),
    })
}

fn require_worker(state: &AppState, headers: &HeaderMap) -> Result<(), RelayError> {
    let Some(expected) = state.worker_api_key.as_deref() else {
        return Ok(());
    };
    let provided = headers.get(WORKER_API_KEY_HEADER).map(|v| v.as_bytes());
    if provided.is_some_and(|p| constant_time_eq(p, expected.as_bytes())) {
        Ok(())
    } else {
        Err(RelayError::Unauthorized(
            "worker API key required".to_string(),
        ))
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn validate_alert(alert: &AlertNotice) -> Result<(), RelayError> {
    if alert.camera_id.as_str().trim().is_empty() {
        return Err(RelayError::InvalidRequest(
            "cameraId must not be empty".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&alert.confidence) {
        return Err(RelayError::InvalidRequest(
            "confidence must be within [0, 1]".to_string(),
        ));
    }
    Ok(())
}

/// Realtime routes mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", post(publish_alert))
        .route("/cameras/{camera_id}/stats", post(publish_camera_stats))
        .route("/realtime/connections", get(connection_counts))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::ws::{AuthGate, RealtimeHub};

    fn app(worker_key: Option<&str>) -> (Router, Arc<RealtimeHub>) {
        let hub = Arc::new(RealtimeHub::new(AuthGate::new(b"secret"), 16));
        let state = AppState::new(Arc::clone(&hub), worker_key.map(str::to_string));
        (Router::new().nest("/api/v1", routes()).with_state(state), hub)
    }

    fn alert_body(camera: &str, confidence: f64) -> String {
        serde_json::json!({
            "id": "alert-1",
            "cameraId": camera,
            "cameraName": "Gate",
            "location": "North",
            "faceCount": 2,
            "confidence": confidence,
            "snapshotUrl": null,
            "timestamp": "2024-05-01T12:00:00Z"
        })
        .to_string()
    }

    fn post_json(uri: &str, body: String, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(uri).header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header(WORKER_API_KEY_HEADER, key);
        }
        let Ok(request) = builder.body(Body::from(body)) else {
            panic!("request build failed");
        };
        request
    }

    #[tokio::test]
    async fn publish_alert_reaches_registered_connection() {
        let (app, hub) = app(None);
        let Ok(claims) = hub.gate().verify(Some(
            &hub.gate()
                .issue_token("alice", "USER", chrono::Duration::minutes(1))
                .unwrap_or_default(),
        )) else {
            panic!("token should verify");
        };
        let mut admission = hub.admit(&claims);
        let _welcome = admission.outbound.try_recv();

        let Ok(response) = app
            .oneshot(post_json("/api/v1/alerts", alert_body("cam-1", 0.9), None))
            .await
        else {
            panic!("request failed");
        };
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(admission.outbound.try_recv().is_ok());
    }

    #[tokio::test]
    async fn worker_key_is_enforced_when_configured() {
        let (app, _hub) = app(Some("k3y"));
        let Ok(denied) = app
            .clone()
            .oneshot(post_json("/api/v1/alerts", alert_body("cam-1", 0.9), None))
            .await
        else {
            panic!("request failed");
        };
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let Ok(allowed) = app
            .oneshot(post_json(
                "/api/v1/alerts",
                alert_body("cam-1", 0.9),
                Some("k3y"),
            ))
            .await
        else {
            panic!("request failed");
        };
        assert_eq!(allowed.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_rejected() {
        let (app, _hub) = app(None);
        let Ok(response) = app
            .oneshot(post_json("/api/v1/alerts", alert_body("cam-1", 1.5), None))
            .await
        else {
            panic!("request failed");
        };
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn camera_stats_accepted() {
        let (app, _hub) = app(None);
        let body = r#"{"isOnline":true,"totalAlerts":10,"recentAlerts":2}"#.to_string();
        let Ok(response) = app
            .oneshot(post_json("/api/v1/cameras/cam-3/stats", body, None))
            .await
        else {
            panic!("request failed");
        };
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn connection_counts_by_owner() {
        let (app, hub) = app(None);
        let Ok(mut a) = hub.admit_token(Some(
            &hub.gate()
                .issue_token("alice", "USER", chrono::Duration::minutes(1))
                .unwrap_or_default(),
        )) else {
            panic!("admission failed");
        };
        let _ = a.outbound.try_recv();

        let Ok(request) = Request::get("/api/v1/realtime/connections?ownerId=alice")
            .body(Body::empty())
        else {
            panic!("request build failed");
        };
        let Ok(response) = app.oneshot(request).await else {
            panic!("request failed");
        };
        assert_eq!(response.status(), StatusCode::OK);
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), 1024).await else {
            panic!("body read failed");
        };
        let Ok(counts) = serde_json::from_slice::<ConnectionCountResponse>(&bytes) else {
            panic!("body parse failed");
        };
        assert_eq!(counts.total, 1);
        assert_eq!(counts.owner, Some(1));
    }

    #[test]
    fn worker_key_comparison_requires_exact_match() {
        assert!(constant_time_eq(b"k3y", b"k3y"));
        assert!(!constant_time_eq(b"k3y", b"k3Y"));
        assert!(!constant_time_eq(b"k3", b"k3y"));
        assert!(!constant_time_eq(b"", b"k3y"));
    }

    #[tokio::test]
    async fn near_miss_worker_key_is_rejected() {
        let (app, _hub) = app(Some("k3y"));
        for key in ["k3", "k3yy", "K3Y"] {
            let Ok(response) = app
                .clone()
                .oneshot(post_json(
                    "/api/v1/alerts",
                    alert_body("cam-1", 0.9),
                    Some(key),
                ))
                .await
            else {
                panic!("request failed");
            };
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
