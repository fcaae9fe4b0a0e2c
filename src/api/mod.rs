//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root next to the `/ws` upgrade endpoint.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    paths(
        handlers::system::health_handler,
        handlers::alerts::publish_alert,
        handlers::alerts::publish_camera_stats,
        handlers::alerts::connection_counts,
    ),
    components(schemas(
        crate::domain::AlertNotice,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
        dto::DeliveryResponse,
        dto::CameraStatsRequest,
        dto::ConnectionCountResponse,
        handlers::system::HealthResponse,
    )),
    tags(
        (name = "Realtime", description = "Event ingestion and connection introspection"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
