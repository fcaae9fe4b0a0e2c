//! Client connection configuration.

use std::time::Duration;

use url::Url;

use super::backoff::ReconnectPolicy;
use super::error::ClientError;
use crate::config::parse_env;

/// Endpoint used when `REALTIME_ENDPOINT` is unset.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:3001/ws";

/// Where and how the [`ConnectionManager`](super::ConnectionManager)
/// connects.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint. The access token is appended as `?token=`.
    pub endpoint: Url,
    /// Interval between keepalive `PING` frames while open.
    pub keepalive_interval: Duration,
    /// Reconnect scheduling.
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Default settings for `endpoint`.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            keepalive_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Parses `endpoint` and applies defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if `endpoint` is not a URL.
    pub fn parse(endpoint: &str) -> Result<Self, ClientError> {
        Ok(Self::new(Url::parse(endpoint)?))
    }

    /// Reads `REALTIME_ENDPOINT`, `KEEPALIVE_INTERVAL_SECS`,
    /// `RECONNECT_BASE_DELAY_MS`, `RECONNECT_MAX_ATTEMPTS` and
    /// `RECONNECT_JITTER`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if `REALTIME_ENDPOINT` is
    /// not a URL.
    pub fn from_env() -> Result<Self, ClientError> {
        let endpoint =
            std::env::var("REALTIME_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let defaults = ReconnectPolicy::default();
        let base_ms = u64::try_from(defaults.base_delay.as_millis()).unwrap_or(u64::MAX);

        Ok(Self::parse(&endpoint)?
            .with_keepalive_interval(Duration::from_secs(
                parse_env("KEEPALIVE_INTERVAL_SECS", 30_u64).max(1),
            ))
            .with_reconnect(ReconnectPolicy {
                base_delay: Duration::from_millis(parse_env("RECONNECT_BASE_DELAY_MS", base_ms)),
                max_attempts: parse_env("RECONNECT_MAX_ATTEMPTS", defaults.max_attempts),
                jitter: parse_env("RECONNECT_JITTER", defaults.jitter),
            }))
    }

    /// Sets the keepalive interval.
    #[must_use]
    pub const fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets the reconnect policy.
    #[must_use]
    pub const fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// The endpoint with `token` appended as a query parameter.
    #[must_use]
    pub fn url_with_token(&self, token: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("token", token);
        url
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_as_query() {
        let Ok(config) = ClientConfig::parse("ws://localhost:3001/ws") else {
            panic!("valid endpoint");
        };
        let url = config.url_with_token("a.b c");
        assert_eq!(url.as_str(), "ws://localhost:3001/ws?token=a.b+c");
        assert_eq!(config.endpoint.query(), None);
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(matches!(
            ClientConfig::parse("not a url"),
            Err(ClientError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn defaults() {
        let Ok(config) = ClientConfig::parse(DEFAULT_ENDPOINT) else {
            panic!("valid endpoint");
        };
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }
}
