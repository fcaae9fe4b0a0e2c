//! The owned real-time delivery component.
//!
//! [`RealtimeHub`] bundles the connection registry, the authentication
//! gate and the broadcaster. It is an ordinary value constructed per
//! server (or per test); nothing in this crate is process-global.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::auth::{AdmissionError, AuthGate, Claims};
use super::broadcaster::{Broadcaster, Delivery};
use super::connection::{Connection, Frame};
use super::messages::{ConnectedNotice, ServerMessage};
use super::registry::ConnectionRegistry;
use crate::config::{DEFAULT_WELCOME_MESSAGE, RelayConfig};
use crate::error::RelayError;

/// Close code used when the server shuts down ("going away").
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// A connection that passed the gate, plus the queue its writer drains.
#[derive(Debug)]
pub struct Admission {
    /// The registered connection.
    pub connection: Arc<Connection>,
    /// Receiving half of the connection's outbound queue.
    pub outbound: mpsc::Receiver<Frame>,
}

/// Registry, gate and broadcaster for one relay instance.
#[derive(Debug)]
pub struct RealtimeHub {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    gate: AuthGate,
    send_buffer_capacity: usize,
    welcome_message: String,
}

impl RealtimeHub {
    /// Creates a hub with an empty registry.
    #[must_use]
    pub fn new(gate: AuthGate, send_buffer_capacity: usize) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
            gate,
            send_buffer_capacity: send_buffer_capacity.max(1),
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
        }
    }

    /// Creates a hub from relay configuration.
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            AuthGate::new(config.access_token_secret.as_bytes()),
            config.send_buffer_capacity,
        )
        .with_welcome_message(config.welcome_message.clone())
    }

    /// Overrides the greeting sent in `CONNECTED`.
    #[must_use]
    pub fn with_welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = message.into();
        self
    }

    /// The connection registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The authentication gate.
    #[must_use]
    pub const fn gate(&self) -> &AuthGate {
        &self.gate
    }

    /// Verifies the handshake credential.
    ///
    /// # Errors
    ///
    /// Returns an [`AdmissionError`] when the token is missing, invalid or
    /// expired. The caller closes the transport with
    /// [`AdmissionError::close_code`].
    pub fn authenticate(&self, token: Option<&str>) -> Result<Claims, AdmissionError> {
        self.gate.verify(token)
    }

    /// Registers a connection for verified `claims` and queues the
    /// `CONNECTED` welcome frame on it.
    pub fn admit(&self, claims: &Claims) -> Admission {
        let id = self.registry.next_connection_id(&claims.user_id);
        let (connection, outbound) =
            Connection::new(id, claims.user_id.clone(), self.send_buffer_capacity);
        self.registry.register(Arc::clone(&connection));

        tracing::info!(
            connection_id = %connection.id(),
            owner_id = %connection.owner_id(),
            "websocket client connected"
        );

        let welcome = ServerMessage::Connected(ConnectedNotice {
            client_id: connection.id().to_string(),
            message: self.welcome_message.clone(),
        });
        if let Err(err) = self.broadcaster.send_to_connection(&connection, &welcome) {
            tracing::warn!(connection_id = %connection.id(), error = %err, "failed to queue welcome");
        }

        Admission {
            connection,
            outbound,
        }
    }

    /// Authenticates and admits in one step.
    ///
    /// # Errors
    ///
    /// Returns an [`AdmissionError`] as [`Self::authenticate`] does; nothing
    /// is registered in that case.
    pub fn admit_token(&self, token: Option<&str>) -> Result<Admission, AdmissionError> {
        let claims = self.authenticate(token)?;
        Ok(self.admit(&claims))
    }

    /// Fans `message` out to every matching connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if the event cannot be
    /// encoded.
    pub fn broadcast(&self, message: &ServerMessage) -> Result<Delivery, RelayError> {
        self.broadcaster.broadcast(message)
    }

    /// Sends `message` to every connection of `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if the event cannot be
    /// encoded.
    pub fn send_to_owner(
        &self,
        owner_id: &str,
        message: &ServerMessage,
    ) -> Result<Delivery, RelayError> {
        self.broadcaster.send_to_owner(owner_id, message)
    }

    /// Sends `message` to one connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if the event cannot be
    /// encoded.
    pub fn send_to_connection(
        &self,
        conn: &Connection,
        message: &ServerMessage,
    ) -> Result<bool, RelayError> {
        self.broadcaster.send_to_connection(conn, message)
    }

    /// Number of live connections.
    #[must_use]
    pub fn count_all(&self) -> usize {
        self.registry.count_all()
    }

    /// Number of live connections for one owner.
    #[must_use]
    pub fn count_by_owner(&self, owner_id: &str) -> usize {
        self.registry.count_by_owner(owner_id)
    }

    /// Closes and unregisters every connection, returning how many there
    /// were.
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let connections = self.registry.drain();
        for conn in &connections {
            conn.close(code, reason);
        }
        connections.len()
    }
}
