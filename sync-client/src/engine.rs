//! SyncEngine - keeps the local store and the remote copy converged.
//!
//! # Architecture
//!
//! The engine feeds events into the pure state machine from sync-core and
//! interprets the returned actions against the store, the transport, the
//! language applier and two timers.
//!
//! ```text
//! edit ──► LocalStore ──► ChangeBus ──► SyncEngine ──► debounce ──► Transport::push
//!              ▲                            │
//!              └──── WriteLocal ◄── resolve ◄── Transport::pull / subscribe
//! ```
//!
//! Locks are never held while writing the store or invoking callbacks: the
//! store write re-enters the engine synchronously through the bus.
//!
//! No public method returns an error. Failures are logged and the device
//! keeps working on its local copy.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use prefsync_core::{Action, EngineState, Event};
use prefsync_types::{Identity, Origin, PreferencePatch, PreferenceRecord};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::bus::{ChangeSignal, SubscriptionId};
use crate::language::LanguageApplier;
use crate::lock;
use crate::store::{LocalStore, StoreError};
use crate::transport::{RemoteSubscription, Transport, UpdateCallback};

/// Quiet period after the last local change before pushing.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

/// Period of the background pull when no live subscription is available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Engine timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Push debounce window.
    pub debounce: Duration,
    /// Background pull period.
    pub poll_interval: Duration,
}

impl EngineConfig {
    /// Set the push debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the background pull period.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What a pull did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// No identity; nothing was fetched.
    SignedOut,
    /// The transport failed, or a newer remote record could not be stored.
    /// The local record is unchanged.
    Failed,
    /// The identity changed while the pull was in flight; the result was
    /// discarded.
    Superseded,
    /// The remote record was newer and is now the local record.
    RemoteApplied(PreferenceRecord),
    /// The local record was kept.
    LocalKept {
        /// True if the remote side is behind and a push was scheduled.
        push_scheduled: bool,
    },
}

/// Keeps one device's preferences in sync with the remote copy.
///
/// Dropping the engine shuts it down.
pub struct SyncEngine<T: Transport + 'static> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: Transport + 'static> {
    config: EngineConfig,
    store: LocalStore,
    transport: T,
    language: Arc<dyn LanguageApplier>,
    state: Mutex<EngineState>,
    identity: Mutex<Option<Identity>>,
    push_timer: Mutex<Option<(u64, JoinHandle<()>)>>,
    push_generation: AtomicU64,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    live: Mutex<Option<RemoteSubscription>>,
    bus_listener: Mutex<Option<SubscriptionId>>,
    warned_signed_out: AtomicBool,
}

impl<T: Transport + 'static> SyncEngine<T> {
    /// Create an engine and start observing the store's change bus.
    ///
    /// Nothing is fetched until [`start`](Self::start).
    pub fn new(
        store: LocalStore,
        transport: T,
        language: Arc<dyn LanguageApplier>,
        config: EngineConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            config,
            store,
            transport,
            language,
            state: Mutex::new(EngineState::new()),
            identity: Mutex::new(None),
            push_timer: Mutex::new(None),
            push_generation: AtomicU64::new(0),
            poll_task: Mutex::new(None),
            live: Mutex::new(None),
            bus_listener: Mutex::new(None),
            warned_signed_out: AtomicBool::new(false),
        });

        let weak: Weak<Inner<T>> = Arc::downgrade(&inner);
        let listener = inner.store.bus().subscribe(move |signal| {
            if let Some(inner) = weak.upgrade() {
                inner.on_signal(signal);
            }
        });
        *lock(&inner.bus_listener) = Some(listener);

        Self { inner }
    }

    /// Seed a never-written record, connect the remote side for `identity`
    /// and run the initial reconciling pull.
    pub async fn start(&self, identity: Option<Identity>) -> PullOutcome {
        let current = self.inner.store.read();
        if current.is_unwritten() {
            let seeded = current.with_updated_at(now_ms());
            match self.inner.store.write(&seeded, Origin::Bootstrap) {
                Ok(_) => tracing::info!("Seeded preferences (updatedAtMs: {})", seeded.updated_at_ms),
                Err(e) => tracing::warn!("Failed to seed preferences: {}", e),
            }
        }

        self.inner.set_identity(identity);
        self.inner.connect_remote();
        self.inner.pull(Origin::RemoteInit).await
    }

    /// Replace the signed-in identity (or sign out with `None`).
    ///
    /// Tears down the previous subscription or poll loop and any pending
    /// push, then connects and reconciles for the new identity.
    pub async fn switch_identity(&self, identity: Option<Identity>) -> PullOutcome {
        self.inner.disconnect_remote();
        self.inner.cancel_push_timer();
        self.inner.set_identity(identity);
        self.inner.connect_remote();
        self.inner.pull(Origin::RemoteInit).await
    }

    /// Apply a user edit and return the stored record.
    ///
    /// The edit is stamped with the current time, and always later than the
    /// record it replaces.
    pub fn edit(&self, patch: &PreferencePatch) -> PreferenceRecord {
        let current = self.inner.store.read();
        let updated_at_ms = now_ms().max(current.updated_at_ms.saturating_add(1));
        let next = patch.apply_to(&current, updated_at_ms);
        match self.inner.store.write(&next, Origin::UserEdit) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Failed to store edit: {}", e);
                current
            }
        }
    }

    /// The current local record.
    pub fn current(&self) -> PreferenceRecord {
        self.inner.store.read()
    }

    /// Observe every local store write.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ChangeSignal) + Send + Sync + 'static,
    {
        self.inner.store.bus().subscribe(handler)
    }

    /// Stop observing. Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.store.bus().unsubscribe(id)
    }

    /// Pull and reconcile now.
    pub async fn pull_now(&self) -> PullOutcome {
        self.inner.pull(Origin::RemotePoll).await
    }

    /// The app came back to the foreground; refresh from the remote side.
    pub async fn on_foreground(&self) -> PullOutcome {
        tracing::debug!("Foreground regained, pulling");
        self.pull_now().await
    }

    /// Push now if a debounced push is pending.
    ///
    /// Returns true if a push was sent and succeeded.
    pub async fn flush(&self) -> bool {
        let pending = lock(&self.inner.push_timer).take();
        match pending {
            Some((_, timer)) if !timer.is_finished() => {
                timer.abort();
                self.inner.push_current().await
            }
            _ => false,
        }
    }

    /// Push the current local record now, regardless of debounce.
    pub async fn push_now(&self) -> bool {
        self.inner.cancel_push_timer();
        self.inner.push_current().await
    }

    /// Cancel timers and subscriptions and stop observing the store.
    ///
    /// A pending push is dropped; call [`flush`](Self::flush) first to keep
    /// it.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Current state machine state.
    pub fn state(&self) -> EngineState {
        *lock(&self.inner.state)
    }

    /// True if a debounced push is waiting to fire.
    pub fn has_pending_push(&self) -> bool {
        lock(&self.inner.push_timer)
            .as_ref()
            .is_some_and(|(_, timer)| !timer.is_finished())
    }

    /// True if a live subscription is open.
    pub fn is_live(&self) -> bool {
        lock(&self.inner.live).is_some()
    }

    /// True if the background poll loop is running.
    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poll_task)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// The signed-in identity.
    pub fn identity(&self) -> Option<Identity> {
        self.inner.identity()
    }

    /// The local store.
    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    /// The transport (for testing).
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Timing configuration.
    pub fn config(&self) -> EngineConfig {
        self.inner.config
    }
}

impl<T: Transport + 'static> Drop for SyncEngine<T> {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl<T: Transport + 'static> std::fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("transport", &self.inner.transport.name())
            .field("state", &self.state())
            .field("identity", &self.identity())
            .field("live", &self.is_live())
            .finish()
    }
}

impl<T: Transport + 'static> Inner<T> {
    fn identity(&self) -> Option<Identity> {
        lock(&self.identity).clone()
    }

    fn set_identity(&self, identity: Option<Identity>) {
        match &identity {
            Some(identity) => tracing::info!("Signed in as {}", identity.uid()),
            None => tracing::info!("Signed out; preferences stay local"),
        }
        *lock(&self.identity) = identity;
        self.warned_signed_out.store(false, Ordering::SeqCst);
    }

    fn warn_signed_out(&self) {
        if !self.warned_signed_out.swap(true, Ordering::SeqCst) {
            tracing::warn!("No signed-in identity; cloud sync skipped");
        }
    }

    /// Run one state machine transition and return its actions.
    fn transition(&self, event: Event) -> Vec<Action> {
        let mut state = lock(&self.state);
        let (next, actions) = state.on_event(event);
        *state = next;
        actions
    }

    fn on_signal(self: &Arc<Self>, signal: &ChangeSignal) {
        let actions = self.transition(Event::LocalChanged {
            origin: signal.origin,
        });
        if let Err(e) = self.execute(actions) {
            tracing::warn!("Failed to handle change signal: {}", e);
        }
    }

    /// Run actions in order. A failed store write stops the remaining
    /// actions, so nothing acts on a record the store does not hold.
    fn execute(self: &Arc<Self>, actions: Vec<Action>) -> Result<(), StoreError> {
        for action in actions {
            match action {
                Action::ArmPushTimer => self.arm_push_timer(),
                Action::CancelPushTimer => self.cancel_push_timer(),
                Action::Push => self.spawn_push(),
                Action::WriteLocal { record, origin } => {
                    self.store.write(&record, origin)?;
                }
                Action::ApplyLanguage { language } => self.apply_language(&language),
            }
        }
        Ok(())
    }

    /// Reconcile against a remote record and report what happened.
    fn receive_remote(
        self: &Arc<Self>,
        remote: Option<PreferenceRecord>,
        origin: Origin,
    ) -> PullOutcome {
        let local = self.store.read();
        let actions = self.transition(Event::RemoteReceived {
            local,
            remote,
            origin,
        });

        let applied = actions.iter().find_map(|action| match action {
            Action::WriteLocal { record, .. } => Some(record.clone()),
            _ => None,
        });
        let push_scheduled = actions.contains(&Action::ArmPushTimer);

        let result = self.execute(actions);

        let Some(record) = applied else {
            return PullOutcome::LocalKept { push_scheduled };
        };
        self.transition(Event::RemoteApplied);

        match result {
            Ok(()) => {
                tracing::info!(
                    "Applied remote preferences (origin: {}, updatedAtMs: {})",
                    origin,
                    record.updated_at_ms
                );
                PullOutcome::RemoteApplied(record)
            }
            Err(e) => {
                tracing::warn!("Failed to store remote preferences: {}", e);
                PullOutcome::Failed
            }
        }
    }

    fn apply_language(&self, language: &str) {
        if !self.language.is_supported(language) {
            tracing::debug!("Language {} not supported, keeping current", language);
            return;
        }
        if self.language.current_language().as_deref() == Some(language) {
            return;
        }
        if let Err(e) = self.language.apply(language) {
            tracing::warn!("Failed to apply language {}: {}", language, e);
        }
    }

    async fn pull(self: &Arc<Self>, origin: Origin) -> PullOutcome {
        let Some(identity) = self.identity() else {
            self.warn_signed_out();
            return PullOutcome::SignedOut;
        };

        let result = self.transport.pull(&identity).await;

        // Drop results fetched for an identity that is no longer current
        if self.identity().as_ref().map(Identity::uid) != Some(identity.uid()) {
            tracing::debug!("Discarding pull for {}: identity changed", identity.uid());
            return PullOutcome::Superseded;
        }

        match result {
            Ok(remote) => self.receive_remote(remote, origin),
            Err(e) => {
                tracing::warn!("Cloud pull via {} failed: {}", self.transport.name(), e);
                PullOutcome::Failed
            }
        }
    }

    async fn push_current(&self) -> bool {
        let Some(identity) = self.identity() else {
            self.warn_signed_out();
            return false;
        };

        let record = self.store.read();
        match self.transport.push(&identity, &record).await {
            Ok(()) => {
                tracing::debug!(
                    "Pushed preferences via {} (updatedAtMs: {})",
                    self.transport.name(),
                    record.updated_at_ms
                );
                true
            }
            Err(e) => {
                tracing::warn!("Cloud push via {} failed: {}", self.transport.name(), e);
                false
            }
        }
    }

    fn arm_push_timer(self: &Arc<Self>) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No async runtime; push not scheduled");
            return;
        };

        let inner = Arc::clone(self);
        let delay = self.config.debounce;
        let generation = self.push_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut slot = lock(&self.push_timer);
        if let Some((_, previous)) = slot.take() {
            previous.abort();
        }
        *slot = Some((
            generation,
            runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                inner.on_push_timer(generation).await;
            }),
        ));
    }

    async fn on_push_timer(self: Arc<Self>, generation: u64) {
        {
            let mut slot = lock(&self.push_timer);
            if slot.as_ref().is_some_and(|(armed, _)| *armed == generation) {
                slot.take();
            }
        }

        for action in self.transition(Event::PushTimerFired) {
            match action {
                Action::Push => {
                    self.push_current().await;
                }
                other => {
                    if let Err(e) = self.execute(vec![other]) {
                        tracing::warn!("Failed to handle push timer: {}", e);
                    }
                }
            }
        }
    }

    fn spawn_push(self: &Arc<Self>) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No async runtime; push dropped");
            return;
        };
        let inner = Arc::clone(self);
        runtime.spawn(async move {
            inner.push_current().await;
        });
    }

    fn cancel_push_timer(&self) {
        if let Some((_, timer)) = lock(&self.push_timer).take() {
            timer.abort();
        }
    }

    fn connect_remote(self: &Arc<Self>) {
        let Some(identity) = self.identity() else {
            self.warn_signed_out();
            return;
        };

        if self.transport.supports_subscribe() {
            let weak = Arc::downgrade(self);
            let uid = identity.uid().to_string();
            let on_update: UpdateCallback = Arc::new(move |record| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.identity().as_ref().map(Identity::uid) == Some(uid.as_str()) {
                    inner.receive_remote(Some(record), Origin::RemoteLive);
                }
            });

            match self.transport.subscribe(&identity, on_update) {
                Ok(subscription) => {
                    *lock(&self.live) = Some(subscription);
                    tracing::info!("Live subscription open via {}", self.transport.name());
                    return;
                }
                Err(e) => {
                    tracing::warn!("Live subscription failed, falling back to polling: {}", e);
                }
            }
        }

        self.start_polling();
    }

    fn start_polling(self: &Arc<Self>) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No async runtime; polling disabled");
            return;
        };

        let weak = Arc::downgrade(self);
        let period = self.config.poll_interval;
        let task = runtime.spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.pull(Origin::RemotePoll).await;
            }
        });

        if let Some(previous) = lock(&self.poll_task).replace(task) {
            previous.abort();
        }
        tracing::info!(
            "Polling via {} every {}s",
            self.transport.name(),
            period.as_secs()
        );
    }

    fn disconnect_remote(&self) {
        if let Some(subscription) = lock(&self.live).take() {
            subscription.cancel();
        }
        if let Some(task) = lock(&self.poll_task).take() {
            task.abort();
        }
    }

    fn shutdown(&self) {
        self.disconnect_remote();
        self.cancel_push_timer();
        if let Some(listener) = lock(&self.bus_listener).take() {
            self.store.bus().unsubscribe(listener);
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChangeBus;
    use crate::language::SupportedLanguages;
    use crate::store::{KeyValueStore, MemoryKeyValueStore};
    use crate::transport::MockTransport;

    fn identity(uid: &str) -> Identity {
        Identity::new(uid, "token").unwrap()
    }

    fn record(language: &str, updated_at_ms: i64) -> PreferenceRecord {
        PreferenceRecord::new(language, "USD", "imperial", "utc", updated_at_ms)
    }

    fn engine_with(
        store: LocalStore,
        transport: MockTransport,
    ) -> (SyncEngine<MockTransport>, Arc<SupportedLanguages>) {
        let languages = Arc::new(SupportedLanguages::default());
        let engine = SyncEngine::new(
            store,
            transport,
            languages.clone(),
            EngineConfig::default(),
        );
        (engine, languages)
    }

    #[test]
    fn default_config_matches_timing() {
        let config = EngineConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(400));
        assert_eq!(config.poll_interval, Duration::from_secs(60));

        let config = config.with_debounce(Duration::from_millis(50));
        assert_eq!(config.debounce, Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn start_seeds_unwritten_record() {
        let store = LocalStore::in_memory();
        let transport = MockTransport::new();
        let (engine, _) = engine_with(store.clone(), transport.clone());

        let origins = Arc::new(Mutex::new(Vec::new()));
        {
            let origins = Arc::clone(&origins);
            engine.subscribe(move |signal| origins.lock().unwrap().push(signal.origin));
        }

        engine.start(Some(identity("u1"))).await;

        assert!(!store.read().is_unwritten());
        assert_eq!(*origins.lock().unwrap(), vec![Origin::Bootstrap]);

        // The seeded record is pushed once the debounce window closes
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.pushed(), vec![store.read()]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_leaves_written_record_alone() {
        let store = LocalStore::in_memory();
        store.write(&record("en", 50), Origin::UserEdit).unwrap();
        let transport = MockTransport::new();
        transport.set_remote(Some(record("en", 50)));
        let (engine, _) = engine_with(store.clone(), transport);

        let outcome = engine.start(Some(identity("u1"))).await;

        assert_eq!(
            outcome,
            PullOutcome::LocalKept {
                push_scheduled: false
            }
        );
        assert_eq!(store.read(), record("en", 50));
    }

    #[tokio::test(start_paused = true)]
    async fn edit_is_always_newer_than_current() {
        let store = LocalStore::in_memory();
        let far_future = now_ms() + 1_000_000;
        store.write(&record("ru", far_future), Origin::UserEdit).unwrap();
        let (engine, _) = engine_with(store, MockTransport::new());

        let edited = engine.edit(&PreferencePatch::new().with_currency("aed"));

        assert_eq!(edited.currency, "AED");
        assert_eq!(edited.language, "ru");
        assert!(edited.updated_at_ms > far_future);
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_never_pulls_or_pushes() {
        let store = LocalStore::in_memory();
        let transport = MockTransport::new();
        let (engine, _) = engine_with(store, transport.clone());

        assert_eq!(engine.start(None).await, PullOutcome::SignedOut);
        engine.edit(&PreferencePatch::new().with_language("en"));
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(transport.pull_count(), 0);
        assert!(transport.pushed().is_empty());
        assert!(!engine.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_language_is_not_applied() {
        let store = LocalStore::in_memory();
        store.write(&record("ru", 1), Origin::UserEdit).unwrap();
        let transport = MockTransport::new();
        transport.set_remote(Some(record("fr", 2)));
        let (engine, languages) = engine_with(store.clone(), transport);

        let outcome = engine.start(Some(identity("u1"))).await;

        assert!(matches!(outcome, PullOutcome::RemoteApplied(_)));
        assert_eq!(store.read().language, "fr");
        assert!(languages.current_language().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pull_keeps_local() {
        let store = LocalStore::in_memory();
        store.write(&record("ru", 10), Origin::UserEdit).unwrap();
        let transport = MockTransport::new();
        transport.fail_next_pull("offline");
        let (engine, _) = engine_with(store.clone(), transport);

        assert_eq!(engine.start(Some(identity("u1"))).await, PullOutcome::Failed);
        assert_eq!(store.read(), record("ru", 10));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    /// Memory backend that refuses writes once `locked` is set.
    #[derive(Default)]
    struct LockableBackend {
        values: MemoryKeyValueStore,
        locked: AtomicBool,
    }

    impl KeyValueStore for LockableBackend {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.values.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.locked.load(Ordering::SeqCst) {
                return Err(StoreError::Write {
                    key: key.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
                });
            }
            self.values.set(key, value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_remote_write_is_reported_and_not_applied() {
        let backend = Arc::new(LockableBackend::default());
        let store = LocalStore::new(backend.clone(), ChangeBus::new());
        store.write(&record("ru", 10), Origin::UserEdit).unwrap();
        backend.locked.store(true, Ordering::SeqCst);

        let transport = MockTransport::new();
        transport.set_remote(Some(record("en", 20)));
        let (engine, languages) = engine_with(store.clone(), transport);

        assert_eq!(engine.start(Some(identity("u1"))).await, PullOutcome::Failed);
        assert_eq!(store.read(), record("ru", 10));
        assert!(languages.current_language().is_none());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_pushes_pending_immediately() {
        let store = LocalStore::in_memory();
        store.write(&record("ru", 1), Origin::UserEdit).unwrap();
        let transport = MockTransport::new();
        transport.set_remote(Some(record("ru", 1)));
        let (engine, _) = engine_with(store, transport.clone());
        engine.start(Some(identity("u1"))).await;

        engine.edit(&PreferencePatch::new().with_timezone("asia/dubai"));
        assert!(engine.has_pending_push());
        assert!(engine.flush().await);

        assert!(!engine.has_pending_push());
        assert_eq!(transport.pushed().len(), 1);
        assert!(!engine.flush().await);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_push_is_not_retried() {
        let store = LocalStore::in_memory();
        store.write(&record("ru", 1), Origin::UserEdit).unwrap();
        let transport = MockTransport::new();
        transport.set_remote(Some(record("ru", 1)));
        let (engine, _) = engine_with(store, transport.clone());
        engine.start(Some(identity("u1"))).await;

        transport.fail_next_push("quota");
        engine.edit(&PreferencePatch::new().with_language("en"));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(transport.pushed().is_empty());
        assert!(!engine.has_pending_push());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_loop_pulls_on_interval() {
        let store = LocalStore::in_memory();
        store.write(&record("ru", 1), Origin::UserEdit).unwrap();
        let transport = MockTransport::new();
        transport.set_remote(Some(record("ru", 1)));
        let (engine, _) = engine_with(store.clone(), transport.clone());
        engine.start(Some(identity("u1"))).await;
        assert!(engine.is_polling());
        assert_eq!(transport.pull_count(), 1);

        transport.set_remote(Some(record("ar", 99)));
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(transport.pull_count(), 2);
        assert_eq!(store.read().language, "ar");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything() {
        let store = LocalStore::in_memory();
        store.write(&record("ru", 1), Origin::UserEdit).unwrap();
        let transport = MockTransport::new();
        let (engine, _) = engine_with(store.clone(), transport.clone());
        engine.start(Some(identity("u1"))).await;

        engine.edit(&PreferencePatch::new().with_language("en"));
        engine.shutdown();
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert!(transport.pushed().is_empty());
        assert_eq!(transport.pull_count(), 1);
        assert_eq!(store.bus().subscriber_count(), 0);
    }
}
