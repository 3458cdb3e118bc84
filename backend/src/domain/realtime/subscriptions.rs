//! Event name to callback table used by the relay.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;

/// Callback invoked with an event payload.
///
/// Identity is the `Arc` allocation: registering a clone of the same `Arc`
/// twice under one event is a no-op.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

fn same_callback(a: &EventCallback, b: &EventCallback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Ordered callbacks per event name.
#[derive(Default)]
pub struct SubscriptionTable {
    entries: Mutex<HashMap<String, Vec<EventCallback>>>,
}

impl SubscriptionTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<EventCallback>>> {
        // Callbacks never run under this lock.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Append `callback` to `event`'s list. Returns `false` when it was
    /// already registered.
    pub fn add(&self, event: &str, callback: EventCallback) -> bool {
        let mut entries = self.lock();
        let list = entries.entry(event.to_owned()).or_default();
        if list.iter().any(|existing| same_callback(existing, &callback)) {
            return false;
        }
        list.push(callback);
        true
    }

    /// Remove `callback` from `event`'s list, dropping the entry once empty.
    /// Returns whether anything was removed.
    pub fn remove(&self, event: &str, callback: &EventCallback) -> bool {
        let mut entries = self.lock();
        let Some(list) = entries.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|existing| !same_callback(existing, callback));
        let removed = list.len() != before;
        if list.is_empty() {
            entries.remove(event);
        }
        removed
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Snapshot of `event`'s callbacks in registration order.
    pub fn callbacks_for(&self, event: &str) -> Vec<EventCallback> {
        self.lock().get(event).cloned().unwrap_or_default()
    }

    /// Number of callbacks registered for `event`.
    pub fn count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }

    /// Whether `event` has an entry.
    pub fn contains(&self, event: &str) -> bool {
        self.lock().contains_key(event)
    }

    /// Whether no event has subscribers.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl fmt::Debug for SubscriptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.lock();
        let mut map = f.debug_map();
        for (event, callbacks) in entries.iter() {
            map.entry(event, &callbacks.len());
        }
        map.finish()
    }
}

/// Handle returned by [`RealtimeRelay::on`](super::RealtimeRelay::on).
///
/// Dropping the handle keeps the subscription; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "keep the handle to unsubscribe later"]
pub struct Subscription {
    event: String,
    callback: EventCallback,
    table: Weak<SubscriptionTable>,
}

impl Subscription {
    pub(crate) fn new(event: &str, callback: EventCallback, table: &Arc<SubscriptionTable>) -> Self {
        Self {
            event: event.to_owned(),
            callback,
            table: Arc::downgrade(table),
        }
    }

    /// Event this subscription listens to.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove exactly this callback. Returns whether it was still registered.
    pub fn unsubscribe(self) -> bool {
        self.table
            .upgrade()
            .is_some_and(|table| table.remove(&self.event, &self.callback))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}
