//! WebSocket layer: admission, connection registry, subscription routing,
//! fan-out and liveness.
//!
//! The endpoint at `/ws?token=…` admits authenticated dashboards. Each
//! admitted [`connection::Connection`] lives in the
//! [`registry::ConnectionRegistry`] owned by a [`hub::RealtimeHub`] until
//! the peer closes, errors, misses two liveness probes, or the server shuts
//! down.

pub mod auth;
pub mod broadcaster;
pub mod connection;
pub mod handler;
pub mod hub;
pub mod liveness;
pub mod messages;
pub mod registry;
pub mod router;
pub mod subscription;

pub use auth::{AdmissionError, AuthGate, Claims};
pub use broadcaster::{Broadcaster, Delivery, FrameEncoder, JsonEncoder};
pub use connection::{Connection, Frame};
pub use hub::{Admission, RealtimeHub};
pub use liveness::LivenessMonitor;
pub use messages::{ClientCommand, ConnectedNotice, ServerMessage};
pub use registry::ConnectionRegistry;
pub use subscription::SubscriptionSet;
