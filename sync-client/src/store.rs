//! Local persistent preference store.
//!
//! The record lives under a single key as a JSON blob. The language is also
//! mirrored under a scalar legacy key that older builds read and wrote; it
//! only fills in the language when the blob has none.
//!
//! Reads never fail: a missing or corrupt blob yields the defaults.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use prefsync_types::{Origin, PreferenceRecord};
use serde_json::Value;
use thiserror::Error;

use crate::bus::{ChangeBus, ChangeSignal};
use crate::lock;

/// Key holding the JSON record blob.
pub const PREFS_KEY: &str = "prefs_v1";

/// Key holding the bare language code.
pub const LEGACY_LANGUAGE_KEY: &str = "lang";

/// Errors from a key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read a key.
    #[error("failed to read {key}: {source}")]
    Read {
        /// Key being read.
        key: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Failed to write a key.
    #[error("failed to write {key}: {source}")]
    Write {
        /// Key being written.
        key: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The record could not be serialized.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Synchronous string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a key. A missing key is `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One file per key inside a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write never leaves a truncated value behind.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Store files under `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the key files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            key: key.to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(write_err)?;
        let tmp = self.dir.join(format!(".{}.tmp", key));
        fs::write(&tmp, value).map_err(write_err)?;
        fs::rename(&tmp, self.path_for(key)).map_err(write_err)
    }
}

/// In-memory backend. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The device's durable copy of the preference record.
///
/// Clones share the backend and the change bus.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueStore>,
    bus: ChangeBus,
}

impl LocalStore {
    /// Wrap a backend, publishing writes on `bus`.
    pub fn new(backend: Arc<dyn KeyValueStore>, bus: ChangeBus) -> Self {
        Self { backend, bus }
    }

    /// A store over a fresh in-memory backend with its own bus.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()), ChangeBus::new())
    }

    /// The bus this store publishes on.
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Current record. Never fails.
    pub fn read(&self) -> PreferenceRecord {
        let blob = match self.backend.get(PREFS_KEY) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!("Preference store unreadable, using defaults: {}", e);
                None
            }
        };

        let parsed = blob.and_then(|text| match serde_json::from_str::<Value>(&text) {
            Ok(value) if value.is_object() => Some(value),
            Ok(_) | Err(_) => {
                tracing::debug!("Ignoring malformed {} blob", PREFS_KEY);
                None
            }
        });

        let Some(value) = parsed else {
            return self.with_legacy_language(PreferenceRecord::default());
        };

        let record = PreferenceRecord::from_value(&value).unwrap_or_default();
        let has_language = value
            .get("language")
            .and_then(Value::as_str)
            .is_some_and(|language| !language.trim().is_empty());
        if has_language {
            record
        } else {
            self.with_legacy_language(record)
        }
    }

    /// Normalize and persist `record`, then raise a change signal.
    ///
    /// No signal is raised if the blob could not be written. Failing to
    /// mirror the legacy language key is logged and otherwise ignored.
    pub fn write(
        &self,
        record: &PreferenceRecord,
        origin: Origin,
    ) -> Result<PreferenceRecord, StoreError> {
        let record = record.clone().normalized();
        let blob = serde_json::to_string(&record)?;
        self.backend.set(PREFS_KEY, &blob)?;
        if let Err(e) = self.backend.set(LEGACY_LANGUAGE_KEY, &record.language) {
            tracing::debug!("Legacy language key not updated: {}", e);
        }

        tracing::debug!(
            "Stored preferences (origin: {}, updatedAtMs: {})",
            origin,
            record.updated_at_ms
        );
        self.bus.emit(&ChangeSignal {
            record: record.clone(),
            origin,
        });
        Ok(record)
    }

    fn with_legacy_language(&self, record: PreferenceRecord) -> PreferenceRecord {
        match self.backend.get(LEGACY_LANGUAGE_KEY) {
            Ok(Some(language)) if !language.trim().is_empty() => {
                PreferenceRecord { language, ..record }.normalized()
            }
            _ => record,
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").field("bus", &self.bus).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory_store() -> (LocalStore, MemoryKeyValueStore) {
        let backend = MemoryKeyValueStore::new();
        let store = LocalStore::new(Arc::new(backend.clone()), ChangeBus::new());
        (store, backend)
    }

    // ===========================================
    // Read Fallback Tests
    // ===========================================

    #[test]
    fn empty_store_reads_defaults() {
        let (store, _) = memory_store();
        assert_eq!(store.read(), PreferenceRecord::default());
    }

    #[test]
    fn corrupt_blob_reads_defaults() {
        let (store, backend) = memory_store();
        backend.set(PREFS_KEY, "{not json").unwrap();
        assert_eq!(store.read(), PreferenceRecord::default());

        backend.set(PREFS_KEY, "[1,2]").unwrap();
        assert_eq!(store.read(), PreferenceRecord::default());
    }

    #[test]
    fn legacy_language_fills_missing_language() {
        let (store, backend) = memory_store();
        backend.set(LEGACY_LANGUAGE_KEY, "EN").unwrap();
        assert_eq!(store.read().language, "en");

        backend
            .set(PREFS_KEY, r#"{"currency":"aed","updatedAtMs":7}"#)
            .unwrap();
        let record = store.read();
        assert_eq!(record.language, "en");
        assert_eq!(record.currency, "AED");
        assert_eq!(record.updated_at_ms, 7);
    }

    #[test]
    fn blob_language_beats_legacy_key() {
        let (store, backend) = memory_store();
        backend.set(LEGACY_LANGUAGE_KEY, "en").unwrap();
        backend
            .set(PREFS_KEY, r#"{"language":"ar","updatedAtMs":3}"#)
            .unwrap();
        assert_eq!(store.read().language, "ar");
    }

    // ===========================================
    // Write Tests
    // ===========================================

    #[test]
    fn write_normalizes_and_mirrors_language() {
        let (store, backend) = memory_store();
        let written = store
            .write(
                &PreferenceRecord::new("EN", "aed", "Metric", "UTC", 10),
                Origin::UserEdit,
            )
            .unwrap();

        assert!(written.is_normalized());
        assert_eq!(store.read(), written);
        assert_eq!(
            backend.get(LEGACY_LANGUAGE_KEY).unwrap().as_deref(),
            Some("en")
        );
    }

    #[test]
    fn write_raises_signal_with_origin() {
        let (store, _) = memory_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            store
                .bus()
                .subscribe(move |signal| seen.lock().unwrap().push(signal.clone()));
        }

        let record = PreferenceRecord::default().with_updated_at(42);
        store.write(&record, Origin::RemotePoll).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, Origin::RemotePoll);
        assert_eq!(seen[0].record, record);
    }

    #[test]
    fn subscriber_reads_new_value_during_signal() {
        let (store, _) = memory_store();
        let observed = Arc::new(Mutex::new(None));
        {
            let reader = store.clone();
            let observed = Arc::clone(&observed);
            store.bus().subscribe(move |_| {
                *observed.lock().unwrap() = Some(reader.read().updated_at_ms);
            });
        }

        store
            .write(&PreferenceRecord::default().with_updated_at(9), Origin::UserEdit)
            .unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(9));
    }

    // ===========================================
    // File Backend Tests
    // ===========================================

    #[test]
    fn file_backend_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let record = PreferenceRecord::new("ar", "AED", "metric", "asia/dubai", 1234);

        let store = LocalStore::new(
            Arc::new(FileKeyValueStore::new(dir.path())),
            ChangeBus::new(),
        );
        store.write(&record, Origin::UserEdit).unwrap();

        let reopened = LocalStore::new(
            Arc::new(FileKeyValueStore::new(dir.path())),
            ChangeBus::new(),
        );
        assert_eq!(reopened.read(), record);
        assert!(dir.path().join(PREFS_KEY).exists());
        assert!(!dir.path().join(format!(".{}.tmp", PREFS_KEY)).exists());
    }

    #[test]
    fn file_backend_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let backend = FileKeyValueStore::new(dir.path().join("nested"));
        assert!(backend.get(PREFS_KEY).unwrap().is_none());
    }

    #[test]
    fn failed_write_raises_no_signal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "a file, not a directory").unwrap();

        let store = LocalStore::new(
            Arc::new(FileKeyValueStore::new(&blocker)),
            ChangeBus::new(),
        );
        let fired = Arc::new(Mutex::new(false));
        {
            let fired = Arc::clone(&fired);
            store
                .bus()
                .subscribe(move |_| *fired.lock().unwrap() = true);
        }

        let result = store.write(&PreferenceRecord::default(), Origin::UserEdit);
        assert!(matches!(result, Err(StoreError::Write { .. })));
        assert!(!*fired.lock().unwrap());
    }
}
