//! Registered callback lists.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An ordered list of callbacks invoked with `&T`.
///
/// Callbacks run on a snapshot taken outside the lock, so a callback may
/// register or unregister handlers without deadlocking.
pub struct HandlerSet<T> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Callback<T>)>>,
}

impl<T> fmt::Debug for HandlerSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Default for HandlerSet<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T: 'static> HandlerSet<T> {
    /// Appends `handler`; the returned registration removes it again.
    pub fn add<F>(self: &Arc<Self>, handler: F) -> HandlerRegistration
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, Arc::new(handler)));

        let set: Weak<Self> = Arc::downgrade(self);
        HandlerRegistration {
            remove: Some(Box::new(move || {
                if let Some(set) = set.upgrade() {
                    set.entries.lock().retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }
}

impl<T> HandlerSet<T> {
    /// Invokes every registered handler in registration order.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in snapshot {
            handler(value);
        }
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Handle returned when registering a handler.
///
/// Dropping it keeps the handler registered; call
/// [`unregister`](Self::unregister) to remove it.
pub struct HandlerRegistration {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

impl HandlerRegistration {
    /// Removes the handler. A no-op if the owning set is gone.
    pub fn unregister(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}
