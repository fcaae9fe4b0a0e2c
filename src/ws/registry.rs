//! Authoritative set of live connections.
//!
//! [`ConnectionRegistry`] stores every admitted connection in a
//! `HashMap` behind a [`parking_lot::Mutex`]. The lock is never held across
//! an `.await` or while frames are queued: iteration works on a snapshot,
//! so the broadcaster and the liveness monitor may remove entries while
//! another pass is in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;

use super::connection::Connection;

/// In-memory registry of admitted connections, keyed by connection id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<Connection>>>,
    last_stamp: AtomicI64,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a connection id for `owner_id`.
    ///
    /// The suffix is a millisecond timestamp forced to be strictly
    /// increasing, so two tabs admitted in the same millisecond still get
    /// distinct ids.
    pub fn next_connection_id(&self, owner_id: &str) -> String {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev.saturating_add(1));
            match self.last_stamp.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return format!("{owner_id}_{next}"),
                Err(actual) => prev = actual,
            }
        }
    }

    /// Inserts a connection, replacing any entry with the same id.
    pub fn register(&self, conn: Arc<Connection>) {
        let id = conn.id().to_string();
        let total = {
            let mut map = self.connections.lock();
            map.insert(id.clone(), conn);
            map.len()
        };
        tracing::debug!(connection_id = %id, total, "connection registered");
    }

    /// Removes a connection. Removing an absent id is a no-op returning
    /// `None`.
    pub fn unregister(&self, id: &str) -> Option<Arc<Connection>> {
        let removed = self.connections.lock().remove(id);
        if removed.is_some() {
            tracing::debug!(connection_id = %id, "connection unregistered");
        }
        removed
    }

    /// Returns the connection with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.lock().get(id).cloned()
    }

    /// Returns a point-in-time copy of all connections.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().values().cloned().collect()
    }

    /// Calls `f` for every connection present when the call started.
    ///
    /// `f` runs without the registry lock held and may itself register or
    /// unregister entries.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Connection>),
    {
        for conn in self.snapshot() {
            f(&conn);
        }
    }

    /// Removes and returns every connection.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().drain().map(|(_, conn)| conn).collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn count_all(&self) -> usize {
        self.connections.lock().len()
    }

    /// Number of live connections opened by `owner_id`.
    #[must_use]
    pub fn count_by_owner(&self, owner_id: &str) -> usize {
        self.connections
            .lock()
            .values()
            .filter(|conn| conn.owner_id() == owner_id)
            .count()
    }
}
