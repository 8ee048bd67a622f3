//! Realtime document transport.
//!
//! Each account owns one document at `<collection>/<uid>`. Pushes merge the
//! record into that document and stamp two audit fields
//! (`serverUpdatedAtMs`, `source`). A subscription watches the document and
//! hands every new version, including this device's own writes, to the
//! engine. Ordering still comes from `updatedAtMs` alone, so an echoed write
//! resolves as a tie and goes nowhere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use prefsync_types::{Identity, PreferenceRecord, RemoteDocument};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::{RemoteSubscription, Transport, TransportError, UpdateCallback};
use crate::lock;

/// Collection used when none is configured.
pub const DEFAULT_COLLECTION: &str = "userPreferences";

/// Buffered versions per watcher before older ones are dropped.
const WATCH_CAPACITY: usize = 16;

/// A document database with per-document change feeds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the document at `path`.
    async fn get(&self, path: &str) -> Result<Option<RemoteDocument>, TransportError>;

    /// Merge `document` into the one at `path`, creating it if needed, and
    /// return the stored result. Fields the caller did not send are kept.
    async fn merge(&self, path: &str, document: RemoteDocument)
        -> Result<RemoteDocument, TransportError>;

    /// Receive every version of `path` written after this call.
    fn watch(&self, path: &str) -> Result<broadcast::Receiver<RemoteDocument>, TransportError>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn get(&self, path: &str) -> Result<Option<RemoteDocument>, TransportError> {
        (**self).get(path).await
    }

    async fn merge(
        &self,
        path: &str,
        document: RemoteDocument,
    ) -> Result<RemoteDocument, TransportError> {
        (**self).merge(path, document).await
    }

    fn watch(&self, path: &str) -> Result<broadcast::Receiver<RemoteDocument>, TransportError> {
        (**self).watch(path)
    }
}

struct DocumentEntry {
    fields: Option<Map<String, Value>>,
    changes: broadcast::Sender<RemoteDocument>,
}

impl DocumentEntry {
    fn new() -> Self {
        let (changes, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            fields: None,
            changes,
        }
    }
}

/// In-process [`DocumentStore`]. Clones share the same documents, so two
/// transports over one store behave like two devices on one backend.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<Mutex<HashMap<String, DocumentEntry>>>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored fields at `path`, audit fields and foreign fields included.
    pub fn raw(&self, path: &str) -> Option<Map<String, Value>> {
        lock(&self.documents)
            .get(path)
            .and_then(|entry| entry.fields.clone())
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        lock(&self.documents)
            .values()
            .filter(|entry| entry.fields.is_some())
            .count()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDocumentStore")
            .field("documents", &self.len())
            .finish()
    }
}

fn decode(path: &str, fields: &Map<String, Value>) -> Result<RemoteDocument, TransportError> {
    serde_json::from_value(Value::Object(fields.clone()))
        .map_err(|e| TransportError::Document(format!("{}: {}", path, e)))
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<RemoteDocument>, TransportError> {
        let documents = lock(&self.documents);
        match documents.get(path).and_then(|entry| entry.fields.as_ref()) {
            Some(fields) => decode(path, fields).map(Some),
            None => Ok(None),
        }
    }

    async fn merge(
        &self,
        path: &str,
        document: RemoteDocument,
    ) -> Result<RemoteDocument, TransportError> {
        let incoming = match serde_json::to_value(&document) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => return Err(TransportError::Document(format!("{}: not an object", path))),
            Err(e) => return Err(TransportError::Document(format!("{}: {}", path, e))),
        };

        let mut documents = lock(&self.documents);
        let entry = documents
            .entry(path.to_string())
            .or_insert_with(DocumentEntry::new);
        let fields = entry.fields.get_or_insert_with(Map::new);
        fields.extend(incoming);
        fields.insert("serverUpdatedAtMs".into(), Value::from(now_ms()));

        let stored = decode(path, fields)?;
        // No receivers is fine
        let _ = entry.changes.send(stored.clone());
        Ok(stored)
    }

    fn watch(&self, path: &str) -> Result<broadcast::Receiver<RemoteDocument>, TransportError> {
        let mut documents = lock(&self.documents);
        let entry = documents
            .entry(path.to_string())
            .or_insert_with(DocumentEntry::new);
        Ok(entry.changes.subscribe())
    }
}

/// Transport over a [`DocumentStore`] with live subscriptions.
#[derive(Debug, Clone)]
pub struct RealtimeTransport<S> {
    store: S,
    collection: String,
}

impl<S: DocumentStore> RealtimeTransport<S> {
    /// Use [`DEFAULT_COLLECTION`] in `store`.
    pub fn new(store: S) -> Self {
        Self::with_collection(store, DEFAULT_COLLECTION)
    }

    /// Use a custom collection in `store`.
    pub fn with_collection(store: S, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Collection holding the per-account documents.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Document path for an account.
    pub fn document_path(&self, uid: &str) -> String {
        format!("{}/{}", self.collection, uid)
    }
}

#[async_trait]
impl<S: DocumentStore> Transport for RealtimeTransport<S> {
    fn name(&self) -> &'static str {
        "realtime"
    }

    async fn pull(&self, identity: &Identity) -> Result<Option<PreferenceRecord>, TransportError> {
        let path = self.document_path(identity.uid());
        Ok(self.store.get(&path).await?.map(|document| document.record))
    }

    async fn push(
        &self,
        identity: &Identity,
        record: &PreferenceRecord,
    ) -> Result<(), TransportError> {
        let path = self.document_path(identity.uid());
        let stored = self
            .store
            .merge(&path, RemoteDocument::outbound(record))
            .await?;
        tracing::debug!(
            "Merged {} (updatedAtMs: {}, serverUpdatedAtMs: {:?})",
            path,
            stored.record.updated_at_ms,
            stored.server_updated_at_ms
        );
        Ok(())
    }

    fn supports_subscribe(&self) -> bool {
        true
    }

    fn subscribe(
        &self,
        identity: &Identity,
        on_update: UpdateCallback,
    ) -> Result<RemoteSubscription, TransportError> {
        let path = self.document_path(identity.uid());
        let mut changes = self.store.watch(&path)?;

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(document) => on_update(document.record),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Older versions were dropped; later receives catch up
                        tracing::debug!("Watcher for {} skipped {} versions", path, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("Watch on {} closed", path);
                        break;
                    }
                }
            }
        });

        Ok(RemoteSubscription::from_task(task))
    }
}
