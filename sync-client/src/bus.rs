//! In-process change bus.
//!
//! Every successful write to the [`LocalStore`](crate::LocalStore) raises a
//! [`ChangeSignal`] here. Subscribers run synchronously, in registration
//! order, on the writer's thread. The subscriber list is snapshotted before
//! delivery, so a handler may subscribe, unsubscribe, or write to the store
//! again without deadlocking.

use std::sync::{Arc, Mutex};

use prefsync_types::{Origin, PreferenceRecord};

use crate::lock;

/// A local store write, as observed by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSignal {
    /// The record now in the store.
    pub record: PreferenceRecord,
    /// Who wrote it.
    pub origin: Origin,
}

/// Handle returned by [`ChangeBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&ChangeSignal) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

/// Synchronous publish/subscribe channel for [`ChangeSignal`]s.
///
/// Clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct ChangeBus {
    inner: Arc<Mutex<BusInner>>,
}

impl ChangeBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It sees every signal emitted after this call.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ChangeSignal) + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.listeners.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = lock(&self.inner);
        let before = inner.listeners.len();
        inner.listeners.retain(|(existing, _)| *existing != id);
        inner.listeners.len() != before
    }

    /// Deliver a signal to every current subscriber.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, signal: &ChangeSignal) -> usize {
        let listeners: Vec<Listener> = lock(&self.inner)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &listeners {
            listener(signal);
        }
        listeners.len()
    }

    /// Number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
