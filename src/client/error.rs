//! Client-side error type.

/// Errors surfaced to error handlers or returned by client calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport failed to connect, send or receive.
    #[error("transport error: {0}")]
    Transport(String),

    /// The configured endpoint is not a valid URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// A frame could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation needs an open connection.
    #[error("not connected")]
    NotConnected,
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
