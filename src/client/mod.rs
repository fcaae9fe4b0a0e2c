//! Dashboard-side client for the relay.
//!
//! [`ConnectionManager`] connects with a bearer token, keeps the
//! connection alive with periodic `PING`s, reconnects with linear backoff,
//! and replays the camera subscription set after every reconnect.

pub mod backoff;
pub mod config;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use config::ClientConfig;
pub use error::ClientError;
pub use handlers::{HandlerRegistration, HandlerSet};
pub use manager::{ConnectionManager, ConnectionState};
pub use transport::{CloseInfo, Connector, Incoming, Transport, TungsteniteConnector};
