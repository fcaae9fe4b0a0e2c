//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::RelayError;

/// Default greeting carried by the `CONNECTED` frame.
pub const DEFAULT_WELCOME_MESSAGE: &str = "Connected to VisionGuard WebSocket server";

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`].
#[derive(Clone)]
pub struct RelayConfig {
    /// Socket address serving both the WebSocket endpoint and REST routes.
    pub listen_addr: SocketAddr,

    /// HS256 secret shared with the login flow.
    pub access_token_secret: String,

    /// When set, ingestion endpoints require this value in the
    /// `X-Backend-Worker-API-Key` header.
    pub worker_api_key: Option<String>,

    /// Seconds between liveness sweeps.
    pub heartbeat_interval_secs: u64,

    /// Frames buffered per connection before it is considered too slow.
    pub send_buffer_capacity: usize,

    /// Greeting sent in the `CONNECTED` frame.
    pub welcome_message: String,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("listen_addr", &self.listen_addr)
            .field("access_token_secret", &"<redacted>")
            .field("worker_api_key", &self.worker_api_key.as_ref().map(|_| "<redacted>"))
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("send_buffer_capacity", &self.send_buffer_capacity)
            .field("welcome_message", &self.welcome_message)
            .finish()
    }
}

impl RelayConfig {
    /// Builds a configuration with defaults for everything except the
    /// secret.
    #[must_use]
    pub fn new(listen_addr: SocketAddr, access_token_secret: impl Into<String>) -> Self {
        Self {
            listen_addr,
            access_token_secret: access_token_secret.into(),
            worker_api_key: None,
            heartbeat_interval_secs: 30,
            send_buffer_capacity: 256,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults for everything except
    /// `ACCESS_TOKEN_SECRET`. Calls `dotenvy::dotenv().ok()` to optionally
    /// load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if `LISTEN_ADDR` cannot be parsed as
    /// a [`SocketAddr`] or `ACCESS_TOKEN_SECRET` is missing or empty.
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3001".to_string())
            .parse()
            .map_err(|e| RelayError::Config(format!("LISTEN_ADDR: {e}")))?;

        let access_token_secret = std::env::var("ACCESS_TOKEN_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RelayError::Config("ACCESS_TOKEN_SECRET is not set".to_string()))?;

        let worker_api_key = std::env::var("BACKEND_WORKER_API_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        let heartbeat_interval_secs = parse_env("HEARTBEAT_INTERVAL_SECS", 30_u64).max(1);
        let send_buffer_capacity = parse_env("SEND_BUFFER_CAPACITY", 256_usize).max(1);
        let welcome_message = std::env::var("WELCOME_MESSAGE")
            .unwrap_or_else(|_| DEFAULT_WELCOME_MESSAGE.to_string());

        Ok(Self {
            listen_addr,
            access_token_secret,
            worker_api_key,
            heartbeat_interval_secs,
            send_buffer_capacity,
            welcome_message,
        })
    }

    /// Liveness sweep period.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
pub(crate) fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
