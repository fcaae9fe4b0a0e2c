//! The transport seam between the connection manager and the socket.
//!
//! [`Connector`] opens a [`Transport`]: a sink of outgoing text frames and
//! a stream of [`Incoming`] events. [`TungsteniteConnector`] is the real
//! implementation; tests substitute in-memory channels.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::future::ready;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::error::ClientError;

/// Close status observed by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code, if the peer sent one.
    pub code: Option<u16>,
    /// Close reason; empty when none was given.
    pub reason: String,
}

impl CloseInfo {
    /// Close code for a normal closure.
    pub const NORMAL: u16 = 1000;
    /// Close code for an abnormal closure (no close frame).
    pub const ABNORMAL: u16 = 1006;
    /// Close code for a policy violation (rejected credential).
    pub const POLICY_VIOLATION: u16 = 1008;

    /// A close with `code` and `reason`.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// An abnormal close: the transport ended without a close frame.
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(Self::ABNORMAL, reason)
    }

    /// Whether this was a normal closure.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.code == Some(Self::NORMAL)
    }

    /// Whether the server rejected the credential.
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        self.code == Some(Self::POLICY_VIOLATION)
    }
}

/// One event read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A text frame.
    Text(String),
    /// The peer closed the connection.
    Closed(CloseInfo),
}

/// Outgoing half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ClientError> + Send>>;
/// Incoming half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Incoming, ClientError>> + Send>>;

/// An open bidirectional text channel.
pub struct Transport {
    /// Outgoing text frames.
    pub sink: FrameSink,
    /// Incoming events.
    pub stream: FrameStream,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug + 'static {
    /// Connects to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the connection cannot be
    /// established.
    async fn connect(&self, url: &Url) -> Result<Transport, ClientError>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Transport, ClientError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (sink, stream) = socket.split();

        let sink = sink
            .with(|text: String| ready(Ok::<_, tokio_tungstenite::tungstenite::Error>(Message::text(text))))
            .sink_map_err(ClientError::from);

        let stream = stream.filter_map(|message| {
            ready(match message {
                Ok(Message::Text(text)) => Some(Ok(Incoming::Text(text.to_string()))),
                Ok(Message::Close(frame)) => Some(Ok(Incoming::Closed(match frame {
                    Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.to_string()),
                    None => CloseInfo {
                        code: None,
                        reason: String::new(),
                    },
                }))),
                Ok(_) => None,
                Err(err) => Some(Err(ClientError::from(err))),
            })
        });

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
