//! # sync-client
//!
//! Local-first preference sync for prefsync.
//!
//! Every device keeps its own durable copy of the user's preferences and
//! works offline. When an account is signed in, the [`SyncEngine`] keeps that
//! copy converged with a single remote record using last-write-wins on
//! `updatedAtMs`.
//!
//! ## Features
//!
//! - **Local-first**: reads never touch the network and never fail
//! - **Debounced pushes**: a burst of edits becomes one outbound write
//! - **Loop-safe**: records accepted from the remote side are never echoed
//! - **Transport Abstraction**: HTTP polling, realtime documents, or mock
//! - **Pure State Machine**: Uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use prefsync_client::{EngineConfig, LocalStore, MockTransport, SupportedLanguages, SyncEngine};
//! use prefsync_types::{Identity, PreferencePatch};
//!
//! let engine = SyncEngine::new(
//!     LocalStore::in_memory(),
//!     MockTransport::new(),
//!     Arc::new(SupportedLanguages::default()),
//!     EngineConfig::default(),
//! );
//! engine.start(Some(Identity::new("uid", "token")?)).await;
//! engine.edit(&PreferencePatch::new().with_currency("AED"));
//! engine.flush().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod engine;
pub mod language;
pub mod store;
pub mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use bus::{ChangeBus, ChangeSignal, SubscriptionId};
pub use engine::{
    now_ms, EngineConfig, PullOutcome, SyncEngine, DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL,
};
pub use language::{LanguageApplier, LanguageError, SupportedLanguages, DEFAULT_SUPPORTED_LANGUAGES};
pub use store::{
    FileKeyValueStore, KeyValueStore, LocalStore, MemoryKeyValueStore, StoreError,
    LEGACY_LANGUAGE_KEY, PREFS_KEY,
};
pub use transport::{
    AnyTransport, DocumentStore, MemoryDocumentStore, MockTransport, PollingConfig,
    PollingTransport, RealtimeTransport, RemoteSubscription, Transport, TransportError,
    UpdateCallback, DEFAULT_COLLECTION, DEFAULT_REQUEST_TIMEOUT,
};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section here leaves its data consistent at each step, so
/// a poisoned lock is still safe to use.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
