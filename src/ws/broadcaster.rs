//! Fan-out of server events to registered connections.
//!
//! Each event is encoded exactly once; the resulting [`Utf8Bytes`] buffer
//! is reference-counted and shared by every recipient's queue. Delivery is
//! best-effort: a recipient whose bounded queue is full is terminated and
//! dropped from the registry instead of stalling everybody else.

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;

use super::connection::{Connection, Frame, SendFailure};
use super::messages::ServerMessage;
use super::registry::ConnectionRegistry;
use crate::error::RelayError;

/// Turns a [`ServerMessage`] into a text frame payload.
pub trait FrameEncoder: Send + Sync + fmt::Debug + 'static {
    /// Encodes `message` into a shareable UTF-8 buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if the message cannot be
    /// encoded.
    fn encode(&self, message: &ServerMessage) -> Result<Utf8Bytes, RelayError>;
}

/// JSON encoder used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncoder;

impl FrameEncoder for JsonEncoder {
    fn encode(&self, message: &ServerMessage) -> Result<Utf8Bytes, RelayError> {
        Ok(Utf8Bytes::from(serde_json::to_string(message)?))
    }
}

/// Outcome of one fan-out pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Recipients whose queue accepted the frame.
    pub delivered: usize,
    /// Recipients dropped because their queue was full or closed.
    pub dropped: usize,
}

/// Delivers events to every eligible connection in the registry.
#[derive(Debug)]
pub struct Broadcaster<E = JsonEncoder> {
    registry: Arc<ConnectionRegistry>,
    encoder: E,
}

impl Broadcaster<JsonEncoder> {
    /// Creates a broadcaster with the JSON encoder.
    #[must_use]
    pub const fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            encoder: JsonEncoder,
        }
    }
}

impl<E: FrameEncoder> Broadcaster<E> {
    /// Creates a broadcaster with a custom encoder.
    #[must_use]
    pub const fn with_encoder(registry: Arc<ConnectionRegistry>, encoder: E) -> Self {
        Self { registry, encoder }
    }

    /// Returns the encoder.
    #[must_use]
    pub const fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Sends `message` to every open connection whose filter accepts the
    /// event's camera (an empty filter accepts all cameras).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if encoding fails; nothing is
    /// sent in that case.
    pub fn broadcast(&self, message: &ServerMessage) -> Result<Delivery, RelayError> {
        let payload = self.encoder.encode(message)?;
        let camera_id = message.camera_id();
        let delivery = self.fan_out(&payload, |conn| conn.wants(camera_id));
        tracing::debug!(
            event = message.type_str(),
            camera_id = ?camera_id,
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "event broadcast"
        );
        Ok(delivery)
    }

    /// Sends `message` to every open connection owned by `owner_id`,
    /// ignoring subscription filters.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if encoding fails.
    pub fn send_to_owner(
        &self,
        owner_id: &str,
        message: &ServerMessage,
    ) -> Result<Delivery, RelayError> {
        let payload = self.encoder.encode(message)?;
        Ok(self.fan_out(&payload, |conn| conn.owner_id() == owner_id))
    }

    /// Sends `message` to a single connection.
    ///
    /// Returns `false` if the connection was not open or had to be dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if encoding fails.
    pub fn send_to_connection(
        &self,
        conn: &Connection,
        message: &ServerMessage,
    ) -> Result<bool, RelayError> {
        let payload = self.encoder.encode(message)?;
        Ok(self.deliver(conn, &payload))
    }

    fn fan_out<P>(&self, payload: &Utf8Bytes, predicate: P) -> Delivery
    where
        P: Fn(&Connection) -> bool,
    {
        let mut delivery = Delivery::default();
        self.registry.for_each(|conn| {
            if !conn.is_open() || !predicate(conn) {
                return;
            }
            if self.deliver(conn, payload) {
                delivery.delivered += 1;
            } else {
                delivery.dropped += 1;
            }
        });
        delivery
    }

    fn deliver(&self, conn: &Connection, payload: &Utf8Bytes) -> bool {
        match conn.try_send(Frame::Text(payload.clone())) {
            Ok(()) => true,
            Err(SendFailure::Full) => {
                tracing::warn!(connection_id = %conn.id(), "outbound buffer full, dropping connection");
                conn.terminate();
                self.registry.unregister(conn.id());
                false
            }
            Err(SendFailure::Closed) => {
                self.registry.unregister(conn.id());
                false
            }
        }
    }
}
