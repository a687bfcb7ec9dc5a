//! Set of live subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::subscriber::Subscriber;

/// Live subscribers keyed by connection id.
///
/// The guard is never held across an `.await`.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<Uuid, Arc<Subscriber>>>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscriber.
    pub fn register(&self, subscriber: Arc<Subscriber>) {
        let _ = self
            .subscribers
            .lock()
            .insert(subscriber.conn_id(), subscriber);
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unregister(&self, subscriber: &Subscriber) -> bool {
        self.subscribers
            .lock()
            .remove(&subscriber.conn_id())
            .is_some()
    }

    /// Whether the subscriber is registered.
    pub fn contains(&self, subscriber: &Subscriber) -> bool {
        self.subscribers.lock().contains_key(&subscriber.conn_id())
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    /// Visit every subscriber while holding the guard. `f` must not block.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Subscriber>)) {
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.values() {
            f(subscriber);
        }
    }
}
