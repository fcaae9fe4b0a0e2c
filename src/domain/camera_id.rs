//! Type-safe camera identifier.
//!
//! [`CameraId`] is a newtype around the opaque string id the record store
//! assigns to a camera. The relay never interprets it; it is only compared
//! for equality when filtering fan-out.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a camera whose alerts a dashboard may subscribe to.
///
/// Serialized transparently as a JSON string (`"cam-1"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    /// Creates a `CameraId` from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CameraId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CameraId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for CameraId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_plain_string() {
        let id = CameraId::new("cam-1");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"cam-1\"");
    }

    #[test]
    fn display_matches_inner() {
        assert_eq!(CameraId::from("lobby").to_string(), "lobby");
    }
}
