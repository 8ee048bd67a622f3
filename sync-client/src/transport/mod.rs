//! Transport abstraction for prefsync.
//!
//! A transport moves whole [`PreferenceRecord`]s between this device and the
//! remote copy for one account. Every transport can pull and push; some can
//! also hold a live subscription that delivers each remote write as it
//! happens.
//!
//! - [`PollingTransport`] - HTTP `GET`/`PUT` against an ordered endpoint list
//! - [`RealtimeTransport`] - one document per account in a [`DocumentStore`]
//! - [`MockTransport`] - in-memory, for tests and offline runs
//!
//! Transport errors are reported to the engine, which logs them and carries
//! on; nothing here retries.

mod mock;
mod polling;
mod realtime;

pub use mock::MockTransport;
pub use polling::{PollingConfig, PollingTransport, DEFAULT_REQUEST_TIMEOUT};
pub use realtime::{DocumentStore, MemoryDocumentStore, RealtimeTransport, DEFAULT_COLLECTION};

use std::sync::Arc;

use async_trait::async_trait;
use prefsync_types::{Identity, PreferenceRecord};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The polling transport has no endpoints to try.
    #[error("no endpoints configured")]
    NoEndpoints,

    /// The request never produced a response.
    #[error("request to {endpoint} failed: {reason}")]
    Request {
        /// Endpoint that was tried.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },

    /// The endpoint answered with a non-success status.
    #[error("{endpoint} returned status {status}")]
    Status {
        /// Endpoint that was tried.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// The endpoint answered with a body that holds no record.
    #[error("{endpoint} returned no usable preferences")]
    InvalidResponse {
        /// Endpoint that was tried.
        endpoint: String,
    },

    /// Every candidate endpoint failed.
    #[error("all {attempted} endpoints failed (last: {last})")]
    AllCandidatesFailed {
        /// Number of endpoints tried.
        attempted: usize,
        /// The final candidate's error.
        last: Box<TransportError>,
    },

    /// The document backend rejected an operation.
    #[error("document store error: {0}")]
    Document(String),

    /// The transport cannot hold a live subscription.
    #[error("{0} transport does not support live subscriptions")]
    SubscribeUnsupported(&'static str),

    /// The remote side is unreachable.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Callback invoked with each record a live subscription delivers.
pub type UpdateCallback = Arc<dyn Fn(PreferenceRecord) + Send + Sync>;

/// A live subscription. Dropping it (or calling [`cancel`](Self::cancel))
/// stops delivery.
pub struct RemoteSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl RemoteSubscription {
    /// Wrap the teardown for a subscription.
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription backed by a background task that is aborted on cancel.
    pub fn from_task(task: tokio::task::JoinHandle<()>) -> Self {
        Self::new(move || task.abort())
    }

    /// Stop delivery now.
    pub fn cancel(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for RemoteSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Moves preference records to and from the remote side.
///
/// Implementations must be cheap to call repeatedly; the engine calls
/// `pull` on every poll tick and `push` after every debounced edit burst.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Fetch the remote record for `identity`. `Ok(None)` means the remote
    /// side has no record yet.
    async fn pull(&self, identity: &Identity) -> Result<Option<PreferenceRecord>, TransportError>;

    /// Replace the remote record for `identity` with `record`.
    async fn push(&self, identity: &Identity, record: &PreferenceRecord)
        -> Result<(), TransportError>;

    /// True if [`subscribe`](Self::subscribe) can succeed.
    fn supports_subscribe(&self) -> bool {
        false
    }

    /// Start delivering every remote write for `identity` to `on_update`.
    ///
    /// The current remote record may be delivered immediately.
    fn subscribe(
        &self,
        _identity: &Identity,
        _on_update: UpdateCallback,
    ) -> Result<RemoteSubscription, TransportError> {
        Err(TransportError::SubscribeUnsupported(self.name()))
    }
}

/// Any of the stock transports, chosen at runtime.
pub enum AnyTransport {
    /// HTTP polling.
    Polling(PollingTransport),
    /// Live document subscription.
    Realtime(RealtimeTransport<Arc<dyn DocumentStore>>),
}

#[async_trait]
impl Transport for AnyTransport {
    fn name(&self) -> &'static str {
        match self {
            Self::Polling(t) => t.name(),
            Self::Realtime(t) => t.name(),
        }
    }

    async fn pull(&self, identity: &Identity) -> Result<Option<PreferenceRecord>, TransportError> {
        match self {
            Self::Polling(t) => t.pull(identity).await,
            Self::Realtime(t) => t.pull(identity).await,
        }
    }

    async fn push(
        &self,
        identity: &Identity,
        record: &PreferenceRecord,
    ) -> Result<(), TransportError> {
        match self {
            Self::Polling(t) => t.push(identity, record).await,
            Self::Realtime(t) => t.push(identity, record).await,
        }
    }

    fn supports_subscribe(&self) -> bool {
        match self {
            Self::Polling(t) => t.supports_subscribe(),
            Self::Realtime(t) => t.supports_subscribe(),
        }
    }

    fn subscribe(
        &self,
        identity: &Identity,
        on_update: UpdateCallback,
    ) -> Result<RemoteSubscription, TransportError> {
        match self {
            Self::Polling(t) => t.subscribe(identity, on_update),
            Self::Realtime(t) => t.subscribe(identity, on_update),
        }
    }
}

impl std::fmt::Debug for AnyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyTransport").field(&self.name()).finish()
    }
}
