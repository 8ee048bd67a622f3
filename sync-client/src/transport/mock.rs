//! Mock transport for testing.
//!
//! Holds a single remote record in memory, records every push, and can
//! simulate live deliveries and forced failures.

use super::{RemoteSubscription, Transport, TransportError, UpdateCallback};
use crate::lock;
use async_trait::async_trait;
use prefsync_types::{Identity, PreferenceRecord};
use std::sync::{Arc, Mutex};

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another.
#[derive(Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    live: bool,
    remote: Option<PreferenceRecord>,
    pushes: Vec<(String, PreferenceRecord)>,
    pull_count: usize,
    offline: bool,
    fail_next_pull: Option<String>,
    fail_next_push: Option<String>,
    next_subscriber: u64,
    subscribers: Vec<(u64, String, UpdateCallback)>,
    subscribed_uids: Vec<String>,
}

impl MockTransport {
    /// Create a pull/push-only mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport that also accepts live subscriptions.
    pub fn with_subscribe() -> Self {
        let transport = Self::default();
        lock(&transport.inner).live = true;
        transport
    }

    /// Replace the remote record without notifying subscribers.
    pub fn set_remote(&self, record: Option<PreferenceRecord>) {
        lock(&self.inner).remote = record;
    }

    /// The current remote record.
    pub fn remote(&self) -> Option<PreferenceRecord> {
        lock(&self.inner).remote.clone()
    }

    /// Simulate a write by another device: store `record` remotely and
    /// deliver it to every live subscriber.
    ///
    /// Returns the number of subscribers notified.
    pub fn deliver_live(&self, record: PreferenceRecord) -> usize {
        let callbacks: Vec<UpdateCallback> = {
            let mut inner = lock(&self.inner);
            inner.remote = Some(record.clone());
            inner
                .subscribers
                .iter()
                .map(|(_, _, callback)| Arc::clone(callback))
                .collect()
        };

        for callback in &callbacks {
            callback(record.clone());
        }
        callbacks.len()
    }

    /// Every record pushed, in order.
    pub fn pushed(&self) -> Vec<PreferenceRecord> {
        lock(&self.inner)
            .pushes
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// The account id of every push, in order.
    pub fn pushed_uids(&self) -> Vec<String> {
        lock(&self.inner)
            .pushes
            .iter()
            .map(|(uid, _)| uid.clone())
            .collect()
    }

    /// The most recent push.
    pub fn last_pushed(&self) -> Option<PreferenceRecord> {
        lock(&self.inner)
            .pushes
            .last()
            .map(|(_, record)| record.clone())
    }

    /// Number of `pull` calls, failed ones included.
    pub fn pull_count(&self) -> usize {
        lock(&self.inner).pull_count
    }

    /// Number of live subscriptions currently open.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }

    /// The account id of every subscription ever opened, in order.
    pub fn subscribed_uids(&self) -> Vec<String> {
        lock(&self.inner).subscribed_uids.clone()
    }

    /// Fail every pull and push until cleared.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.inner).offline = offline;
    }

    /// Cause the next pull() to fail with the given error.
    pub fn fail_next_pull(&self, error: &str) {
        lock(&self.inner).fail_next_pull = Some(error.to_string());
    }

    /// Cause the next push() to fail with the given error.
    pub fn fail_next_push(&self, error: &str) {
        lock(&self.inner).fail_next_push = Some(error.to_string());
    }

    /// Clear recorded calls and forced failures. Subscriptions stay open.
    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.remote = None;
        inner.pushes.clear();
        inner.pull_count = 0;
        inner.offline = false;
        inner.fail_next_pull = None;
        inner.fail_next_push = None;
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("MockTransport")
            .field("live", &inner.live)
            .field("remote", &inner.remote)
            .field("pushes", &inner.pushes.len())
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn pull(&self, _identity: &Identity) -> Result<Option<PreferenceRecord>, TransportError> {
        let mut inner = lock(&self.inner);
        inner.pull_count += 1;

        // Check for forced failure
        if let Some(error) = inner.fail_next_pull.take() {
            return Err(TransportError::Unavailable(error));
        }
        if inner.offline {
            return Err(TransportError::Unavailable("offline".into()));
        }

        Ok(inner.remote.clone())
    }

    async fn push(
        &self,
        identity: &Identity,
        record: &PreferenceRecord,
    ) -> Result<(), TransportError> {
        let mut inner = lock(&self.inner);

        if let Some(error) = inner.fail_next_push.take() {
            return Err(TransportError::Unavailable(error));
        }
        if inner.offline {
            return Err(TransportError::Unavailable("offline".into()));
        }

        let record = record.clone().normalized();
        inner
            .pushes
            .push((identity.uid().to_string(), record.clone()));
        inner.remote = Some(record);
        Ok(())
    }

    fn supports_subscribe(&self) -> bool {
        lock(&self.inner).live
    }

    fn subscribe(
        &self,
        identity: &Identity,
        on_update: UpdateCallback,
    ) -> Result<RemoteSubscription, TransportError> {
        let id = {
            let mut inner = lock(&self.inner);
            if !inner.live {
                return Err(TransportError::SubscribeUnsupported("mock"));
            }
            inner.next_subscriber += 1;
            let id = inner.next_subscriber;
            let uid = identity.uid().to_string();
            inner.subscribed_uids.push(uid.clone());
            inner.subscribers.push((id, uid, on_update));
            id
        };

        let shared = Arc::clone(&self.inner);
        Ok(RemoteSubscription::new(move || {
            lock(&shared)
                .subscribers
                .retain(|(existing, _, _)| *existing != id);
        }))
    }
}
