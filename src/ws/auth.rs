//! Bearer credential verification at handshake time.
//!
//! Browsers cannot set headers on a WebSocket upgrade, so the access token
//! travels in the `token` query parameter. The token is an HS256 JWT minted
//! by the login flow with `{userId, role, iat, exp}` claims; only its
//! signature and expiry are checked here. The token value is never logged.

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// WebSocket close code for admission failures ("policy violation").
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Owner (user) id the token was minted for.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Role of the user; informational only.
    #[serde(default)]
    pub role: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

/// Why a handshake was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// No `token` query parameter.
    #[error("authentication required")]
    MissingToken,
    /// Signature or shape check failed.
    #[error("invalid token")]
    InvalidToken,
    /// Token is past its `exp`.
    #[error("token expired")]
    Expired,
}

impl AdmissionError {
    /// Close code sent to the peer.
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        CLOSE_POLICY_VIOLATION
    }

    /// Short reason string sent with the close frame.
    #[must_use]
    pub const fn close_reason(&self) -> &'static str {
        match self {
            Self::MissingToken => "Authentication required",
            Self::InvalidToken | Self::Expired => "Invalid token",
        }
    }
}

/// Verifies (and, for tooling, mints) access tokens against a shared
/// secret.
#[derive(Clone)]
pub struct AuthGate {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate").finish_non_exhaustive()
    }
}

impl AuthGate {
    /// Creates a gate for the given HS256 secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Verifies an optional raw token taken from the handshake query.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::MissingToken`] when `token` is absent or
    /// empty, [`AdmissionError::Expired`] when it is past expiry, and
    /// [`AdmissionError::InvalidToken`] for any other verification failure.
    pub fn verify(&self, token: Option<&str>) -> Result<Claims, AdmissionError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AdmissionError::MissingToken)?;
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AdmissionError::Expired,
                _ => AdmissionError::InvalidToken,
            })
    }

    /// Mints a token for `user_id` valid for `ttl` (negative values yield
    /// an already-expired token).
    ///
    /// Real credentials come from the login flow; this exists for tests and
    /// local tooling.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`jsonwebtoken::errors::Error`] if signing
    /// fails.
    pub fn issue_token(
        &self,
        user_id: &str,
        role: &str,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user_id.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }
}
