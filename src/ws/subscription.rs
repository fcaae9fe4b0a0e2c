//! Per-connection camera subscription set.
//!
//! Tracks which camera ids a dashboard connection asked for and provides
//! server-side event filtering.

use std::collections::HashSet;

use crate::domain::CameraId;

/// Camera filter for a single connection.
///
/// An empty set is the wildcard: the connection receives events for every
/// camera. Once at least one camera is listed, only those cameras pass.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionSet {
    camera_ids: HashSet<CameraId>,
}

impl SubscriptionSet {
    /// Creates an empty (wildcard) subscription set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a camera. Returns `false` if it was already present.
    pub fn subscribe(&mut self, camera_id: CameraId) -> bool {
        self.camera_ids.insert(camera_id)
    }

    /// Removes a camera. Returns `false` if it was not present.
    pub fn unsubscribe(&mut self, camera_id: &CameraId) -> bool {
        self.camera_ids.remove(camera_id)
    }

    /// Returns `true` if an event for `camera_id` should be delivered.
    ///
    /// Events that carry no camera always match.
    #[must_use]
    pub fn matches(&self, camera_id: Option<&CameraId>) -> bool {
        match camera_id {
            Some(id) => self.is_wildcard() || self.camera_ids.contains(id),
            None => true,
        }
    }

    /// Returns `true` when no camera is listed, i.e. everything matches.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.camera_ids.is_empty()
    }

    /// Returns the number of explicitly subscribed cameras.
    #[must_use]
    pub fn count(&self) -> usize {
        self.camera_ids.len()
    }
}
