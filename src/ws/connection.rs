//! A single admitted dashboard connection and its socket loop.
//!
//! Each [`Connection`] owns a bounded outbound queue drained by a writer
//! task; everything else in the process talks to the socket only through
//! [`Connection::try_send`], so a slow peer can never stall a fan-out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use super::hub::RealtimeHub;
use super::router;
use super::subscription::SubscriptionSet;
use crate::domain::CameraId;

/// Frame queued for the writer task.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Pre-encoded JSON text frame, shared between recipients.
    Text(Utf8Bytes),
    /// Transport-level liveness probe.
    Ping,
    /// Graceful close; the writer stops after sending it.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Human-readable reason.
        reason: String,
    },
}

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendFailure {
    /// The outbound buffer is full; the peer is not keeping up.
    #[error("outbound buffer full")]
    Full,
    /// The writer task is gone.
    #[error("connection closed")]
    Closed,
}

/// Server-side state of one live dashboard connection.
#[derive(Debug)]
pub struct Connection {
    id: String,
    owner_id: String,
    connected_at: DateTime<Utc>,
    alive: AtomicBool,
    terminated: AtomicBool,
    kill: Notify,
    subscriptions: Mutex<SubscriptionSet>,
    outbound: mpsc::Sender<Frame>,
}

impl Connection {
    /// Creates a connection with an outbound queue of `capacity` frames.
    ///
    /// Returns the connection together with the receiving half that the
    /// writer task drains.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id: id.into(),
            owner_id: owner_id.into(),
            connected_at: Utc::now(),
            alive: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            kill: Notify::new(),
            subscriptions: Mutex::new(SubscriptionSet::new()),
            outbound,
        });
        (conn, rx)
    }

    /// Connection identifier (`<owner>_<millis>`).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the user the credential was minted for.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Admission time.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Whether the peer answered the last liveness probe.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Records a pong from the peer.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Clears the liveness flag, returning its previous value.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Whether frames can still be queued for this connection.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.terminated.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Adds a camera to this connection's filter.
    pub fn subscribe(&self, camera_id: CameraId) -> bool {
        self.subscriptions.lock().subscribe(camera_id)
    }

    /// Removes a camera from this connection's filter.
    pub fn unsubscribe(&self, camera_id: &CameraId) -> bool {
        self.subscriptions.lock().unsubscribe(camera_id)
    }

    /// Whether an event for `camera_id` passes this connection's filter.
    #[must_use]
    pub fn wants(&self, camera_id: Option<&CameraId>) -> bool {
        self.subscriptions.lock().matches(camera_id)
    }

    /// Number of explicitly subscribed cameras.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().count()
    }

    /// Queues a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SendFailure::Full`] when the bounded buffer is exhausted
    /// and [`SendFailure::Closed`] when the writer has stopped.
    pub fn try_send(&self, frame: Frame) -> Result<(), SendFailure> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(SendFailure::Closed);
        }
        self.outbound.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SendFailure::Full,
            mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    /// Asks the peer to close; falls back to [`Self::terminate`] when the
    /// close frame cannot be queued.
    pub fn close(&self, code: u16, reason: &str) {
        let frame = Frame::Close {
            code,
            reason: reason.to_string(),
        };
        if self.try_send(frame).is_err() {
            self.terminate();
        }
    }

    /// Drops the transport without a closing handshake.
    pub fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            self.kill.notify_one();
        }
    }

    async fn terminated(&self) {
        self.kill.notified().await;
    }
}

/// Runs the read/write loop for an admitted connection.
///
/// - The writer task forwards queued [`Frame`]s to the socket.
/// - The reader routes control frames and records pongs.
///
/// On exit, for any reason, the connection is removed from the registry.
pub async fn run_connection(
    socket: WebSocket,
    hub: Arc<RealtimeHub>,
    conn: Arc<Connection>,
    outbound: mpsc::Receiver<Frame>,
) {
    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(write_loop(ws_tx, outbound));

    loop {
        tokio::select! {
            () = conn.terminated() => {
                tracing::debug!(connection_id = %conn.id(), "connection terminated");
                break;
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = router::route(&conn, text.as_str()).reply()
                            && let Err(err) = hub.send_to_connection(&conn, &reply)
                        {
                            tracing::warn!(connection_id = %conn.id(), error = %err, "failed to send reply");
                        }
                    }
                    Some(Ok(Message::Pong(_))) => conn.mark_alive(),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(connection_id = %conn.id(), reason = ?frame, "client initiated close");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(connection_id = %conn.id(), error = %err, "websocket receive error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    writer.abort();
    hub.registry().unregister(conn.id());
    tracing::info!(
        connection_id = %conn.id(),
        owner_id = %conn.owner_id(),
        "websocket client disconnected"
    );
}

async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        let (message, last) = match frame {
            Frame::Text(text) => (Message::Text(text), false),
            Frame::Ping => (Message::Ping(Bytes::new()), false),
            Frame::Close { code, reason } => (
                Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
                true,
            ),
        };
        if sink.send(message).await.is_err() || last {
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn terminate_wakes_reader() {
        let (conn, _rx) = Connection::new("u1_1", "u1", 4);
        let mut waiter = tokio_test::task::spawn(conn.terminated());
        tokio_test::assert_pending!(waiter.poll());

        conn.terminate();
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
        assert!(!conn.is_open());
    }

    #[test]
    fn terminate_before_wait_is_not_lost() {
        let (conn, _rx) = Connection::new("u1_1", "u1", 4);
        conn.terminate();
        conn.terminate();
        let mut waiter = tokio_test::task::spawn(conn.terminated());
        tokio_test::assert_ready!(waiter.poll());
    }

    #[test]
    fn starts_alive_and_open() {
        let (conn, _rx) = Connection::new("u1_1", "u1", 4);
        assert!(conn.is_alive());
        assert!(conn.is_open());
        assert_eq!(conn.owner_id(), "u1");
    }

    #[test]
    fn take_alive_clears_flag() {
        let (conn, _rx) = Connection::new("u1_1", "u1", 4);
        assert!(conn.take_alive());
        assert!(!conn.take_alive());
        conn.mark_alive();
        assert!(conn.is_alive());
    }

    #[test]
    fn full_buffer_reports_full() {
        let (conn, _rx) = Connection::new("u1_1", "u1", 1);
        assert_eq!(conn.try_send(Frame::Ping), Ok(()));
        assert_eq!(conn.try_send(Frame::Ping), Err(SendFailure::Full));
    }

    #[test]
    fn dropped_receiver_reports_closed() {
        let (conn, rx) = Connection::new("u1_1", "u1", 4);
        drop(rx);
        assert!(!conn.is_open());
        assert_eq!(conn.try_send(Frame::Ping), Err(SendFailure::Closed));
    }

    #[test]
    fn terminate_closes_send_path() {
        let (conn, _rx) = Connection::new("u1_1", "u1", 4);
        conn.terminate();
        assert!(!conn.is_open());
        assert_eq!(conn.try_send(Frame::Ping), Err(SendFailure::Closed));
    }

    #[tokio::test]
    async fn terminate_wakes_waiter() {
        let (conn, _rx) = Connection::new("u1_1", "u1", 4);
        conn.terminate();
        let woke = tokio::time::timeout(std::time::Duration::from_secs(1), conn.terminated()).await;
        assert!(woke.is_ok());
    }

    #[test]
    fn close_queues_close_frame() {
        let (conn, mut rx) = Connection::new("u1_1", "u1", 4);
        conn.close(1001, "bye");
        let Ok(Frame::Close { code, reason }) = rx.try_recv() else {
            panic!("expected close frame");
        };
        assert_eq!(code, 1001);
        assert_eq!(reason, "bye");
    }
}
