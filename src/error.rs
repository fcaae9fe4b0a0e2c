//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type for the server side. Each
//! variant maps to a specific HTTP status code and structured JSON error
//! response. Admission failures on the WebSocket path have their own type,
//! [`crate::ws::auth::AdmissionError`], because they end in a close frame
//! rather than an HTTP response.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Body returned by every failing REST call.
///
/// ```json
/// { "error": { "code": 1001, "message": "invalid request: cameraId must not be empty" } }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// The failure.
    pub error: ErrorBody,
}

/// Code, message and optional detail of a failure.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable numeric code; see [`RelayError`].
    pub code: u32,
    /// Display text of the error.
    pub message: String,
    /// Category hint for server-side failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side failures.
///
/// Codes `1xxx` are caller mistakes (400), `2xxx` access failures (401),
/// `3xxx` relay faults (500).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed or out-of-range ingestion payload.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or wrong worker API key on an ingestion endpoint.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An event could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Socket-level failure (bind, accept).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background task failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Numeric code sent in [`ErrorBody::code`].
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Unauthorized(_) => 2001,
            Self::Internal(_) => 3000,
            Self::Serialization(_) => 3001,
            Self::Io(_) => 3002,
            Self::Config(_) => 3003,
        }
    }

    /// HTTP status the error is rendered with.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Serialization(_) | Self::Io(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    const fn category(&self) -> Option<&'static str> {
        match self {
            Self::InvalidRequest(_) | Self::Unauthorized(_) => None,
            Self::Serialization(_) => Some("serialization"),
            Self::Io(_) => Some("io"),
            Self::Config(_) => Some("config"),
            Self::Internal(_) => Some("internal"),
        }
    }
}

impl From<&RelayError> for ErrorResponse {
    fn from(err: &RelayError) -> Self {
        Self {
            error: ErrorBody {
                code: err.error_code(),
                message: err.to_string(),
                details: err.category().map(str::to_string),
            },
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (self.status_code(), Json(ErrorResponse::from(&self))).into_response()
    }
}
