//! CLI command implementations.

pub mod login;
pub mod set;
pub mod show;
pub mod status;
pub mod sync;
pub mod watch;

use anyhow::{Context, Result};
use prefsync_client::{
    AnyTransport, ChangeBus, DocumentStore, FileKeyValueStore, LocalStore, MemoryDocumentStore,
    PollingTransport, PullOutcome, RealtimeTransport, SupportedLanguages, SyncEngine,
};
use prefsync_types::{Identity, PreferenceRecord};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{resolve_identity, AppConfig, IdentitySource, ENV_TOKEN, ENV_UID};

/// Directory under the data dir holding the local store files.
pub const STORE_DIR: &str = "store";

/// Everything a command needs to build an engine.
#[derive(Debug, Clone)]
pub struct Session {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Loaded configuration, environment overrides applied.
    pub config: AppConfig,
    /// Use an in-process realtime backend instead of HTTP.
    pub mock: bool,
}

impl Session {
    /// The device's local store.
    pub fn store(&self) -> LocalStore {
        LocalStore::new(
            Arc::new(FileKeyValueStore::new(self.data_dir.join(STORE_DIR))),
            ChangeBus::new(),
        )
    }

    /// The transport selected by `--mock` and the config.
    pub fn transport(&self) -> Result<AnyTransport> {
        if self.mock {
            let backend: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
            return Ok(AnyTransport::Realtime(RealtimeTransport::with_collection(
                backend,
                self.config.sync.collection.clone(),
            )));
        }

        let transport = PollingTransport::new(self.config.polling_config())
            .context("Failed to create HTTP client")?;
        Ok(AnyTransport::Polling(transport))
    }

    /// An engine over a fresh store handle and transport.
    pub fn engine(&self) -> Result<SyncEngine<AnyTransport>> {
        let store = self.store();
        let languages = SupportedLanguages::new(&self.config.language.supported)
            .with_current(store.read().language);
        Ok(SyncEngine::new(
            store,
            self.transport()?,
            Arc::new(languages),
            self.config.engine_config(),
        ))
    }

    /// The active identity, from the environment or the identity file.
    pub async fn identity(&self) -> Result<Option<(Identity, IdentitySource)>> {
        resolve_identity(
            &self.data_dir,
            std::env::var(ENV_UID).ok(),
            std::env::var(ENV_TOKEN).ok(),
        )
        .await
    }

    /// Short name of the selected transport.
    pub fn transport_label(&self) -> &'static str {
        if self.mock {
            "realtime (in-process mock)"
        } else {
            "polling"
        }
    }
}

/// Print a record as aligned `key: value` lines.
pub fn print_record(record: &PreferenceRecord) {
    println!("  Language:     {}", record.language);
    println!("  Currency:     {}", record.currency);
    println!("  Units:        {}", record.metric_system);
    println!("  Timezone:     {}", record.timezone);
    println!("  Updated (ms): {}", record.updated_at_ms);
}

/// One-line description of a pull outcome.
pub fn describe_outcome(outcome: &PullOutcome) -> String {
    match outcome {
        PullOutcome::SignedOut => "signed out, local only".to_string(),
        PullOutcome::Failed => "sync failed, kept local".to_string(),
        PullOutcome::Superseded => "identity changed during pull".to_string(),
        PullOutcome::RemoteApplied(record) => {
            format!("applied remote record ({})", record.updated_at_ms)
        }
        PullOutcome::LocalKept {
            push_scheduled: true,
        } => "local is newer, pushing".to_string(),
        PullOutcome::LocalKept {
            push_scheduled: false,
        } => "already up to date".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn session(mock: bool) -> (tempfile::TempDir, Session) {
        let dir = tempdir().unwrap();
        let session = Session {
            data_dir: dir.path().to_path_buf(),
            config: AppConfig::default(),
            mock,
        };
        (dir, session)
    }

    #[test]
    fn mock_session_uses_realtime() {
        let (_dir, session) = session(true);
        let transport = session.transport().unwrap();
        assert!(matches!(transport, AnyTransport::Realtime(_)));
        assert_eq!(session.transport_label(), "realtime (in-process mock)");
    }

    #[test]
    fn default_session_uses_polling() {
        let (_dir, session) = session(false);
        assert!(matches!(
            session.transport().unwrap(),
            AnyTransport::Polling(_)
        ));
    }

    #[test]
    fn store_lives_under_data_dir() {
        let (dir, session) = session(false);
        session
            .store()
            .write(
                &PreferenceRecord::default().with_updated_at(1),
                prefsync_types::Origin::UserEdit,
            )
            .unwrap();
        assert!(dir.path().join(STORE_DIR).join("prefs_v1").exists());
    }

    #[test]
    fn outcomes_have_descriptions() {
        assert_eq!(
            describe_outcome(&PullOutcome::LocalKept {
                push_scheduled: false
            }),
            "already up to date"
        );
        assert!(describe_outcome(&PullOutcome::RemoteApplied(
            PreferenceRecord::default().with_updated_at(7)
        ))
        .contains('7'));
    }
}
