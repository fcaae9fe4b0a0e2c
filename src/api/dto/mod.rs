//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names follow the dashboard's camelCase convention so REST and
//! WebSocket payloads share one shape.

pub mod realtime_dto;

pub use realtime_dto::*;
