//! Listener registration with explicit unsubscribe handles.
//!
//! Replaces ad-hoc event-emitter wiring: observers register a callback and
//! get back a [`Subscription`] whose `unsubscribe()` detaches them. A
//! panicking listener never prevents the remaining listeners from being
//! notified.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Entries<T> = Arc<Mutex<Vec<(u64, Callback<T>)>>>;

/// A registry of observers for values of type `T`
pub struct Listeners<T> {
    entries: Entries<T>,
    next_id: AtomicU64,
}

impl<T: 'static> Listeners<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener and return its unsubscribe handle
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.register(Arc::new(listener), None)
    }

    /// Register a listener, invoking it synchronously with `current` first
    pub fn subscribe_and_replay(
        &self,
        listener: impl Fn(&T) + Send + Sync + 'static,
        current: &T,
    ) -> Subscription {
        self.register(Arc::new(listener), Some(current))
    }

    fn register(&self, callback: Callback<T>, replay: Option<&T>) -> Subscription {
        if let Some(value) = replay {
            invoke(&callback, value);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, callback));

        let entries = Arc::downgrade(&self.entries);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(entries) = entries.upgrade() {
                    entries.lock().retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Notify every registered listener with `value`
    pub fn notify(&self, value: &T) {
        // Snapshot outside the lock so listeners may (un)subscribe re-entrantly
        let callbacks: Vec<Callback<T>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            invoke(&callback, value);
        }
    }

    /// Drop all registered listeners
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn invoke<T>(callback: &Callback<T>, value: &T) {
    if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
        tracing::warn!("State listener panicked; continuing with remaining listeners");
    }
}

/// Handle returned by `subscribe`; detaches the listener on `unsubscribe()`.
///
/// Dropping the handle without calling `unsubscribe()` leaves the listener
/// registered.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Detach the listener this handle was returned for
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
