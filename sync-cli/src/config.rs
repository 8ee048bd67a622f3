//! Configuration management for prefsync.
//!
//! Settings come from a TOML file (default: `<data-dir>/prefsync.toml`);
//! every section and field is optional. The signed-in identity lives in
//! `identity.json` next to it, readable by the owner only.

use anyhow::{Context, Result};
use prefsync_client::{EngineConfig, PollingConfig, DEFAULT_COLLECTION, DEFAULT_SUPPORTED_LANGUAGES};
use prefsync_types::Identity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "prefsync.toml";

/// Identity file name inside the data directory.
pub const IDENTITY_FILE: &str = "identity.json";

/// Prepended to the configured endpoint list.
pub const ENV_ENDPOINT: &str = "PREFSYNC_ENDPOINT";
/// Account id override.
pub const ENV_UID: &str = "PREFSYNC_UID";
/// Credential override.
pub const ENV_TOKEN: &str = "PREFSYNC_TOKEN";

/// Root configuration for prefsync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    /// Sync configuration.
    #[serde(default)]
    pub sync: SyncSection,
    /// Language configuration.
    #[serde(default)]
    pub language: LanguageSection,
}

/// Sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncSection {
    /// Candidate endpoints for the polling transport, tried in order.
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Push debounce in milliseconds (default: 400).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Background pull period in seconds (default: 60).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Realtime document collection (default: userPreferences).
    #[serde(default = "default_collection")]
    pub collection: String,
}

/// Language configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LanguageSection {
    /// Language codes that may become active (default: ru, en, ar).
    #[serde(default = "default_supported_languages")]
    pub supported: Vec<String>,
}

// Default value functions
fn default_debounce_ms() -> u64 {
    400
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_supported_languages() -> Vec<String> {
    DEFAULT_SUPPORTED_LANGUAGES
        .iter()
        .map(|code| code.to_string())
        .collect()
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            debounce_ms: default_debounce_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            collection: default_collection(),
        }
    }
}

impl Default for LanguageSection {
    fn default() -> Self {
        Self {
            supported: default_supported_languages(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides.
    pub fn with_env_endpoint(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            self.sync.endpoints.retain(|existing| *existing != endpoint);
            self.sync.endpoints.insert(0, endpoint);
        }
        self
    }

    /// Engine timing from the `[sync]` section.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_debounce(Duration::from_millis(self.sync.debounce_ms))
            .with_poll_interval(Duration::from_secs(self.sync.poll_interval_secs.max(1)))
    }

    /// Polling transport settings from the `[sync]` section.
    pub fn polling_config(&self) -> PollingConfig {
        PollingConfig::new(self.sync.endpoints.clone())
            .with_request_timeout(Duration::from_secs(self.sync.request_timeout_secs.max(1)))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

/// Signed-in identity stored locally.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Account id.
    pub uid: String,
    /// Bearer credential.
    pub auth_token: String,
    /// When the identity was saved (Unix seconds).
    pub saved_at: u64,
}

impl IdentityConfig {
    /// Create a new identity configuration.
    pub fn new(identity: &Identity) -> Self {
        Self {
            uid: identity.uid().to_string(),
            auth_token: identity.auth_token().to_string(),
            saved_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0),
        }
    }

    /// Load the identity from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(IDENTITY_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Not signed in. Run 'prefsync login' first.")?;
        serde_json::from_str(&contents).context("Invalid identity file")
    }

    /// Save the identity to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(IDENTITY_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save identity")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Delete the stored identity. Returns false if there was none.
    pub async fn remove(data_dir: &Path) -> Result<bool> {
        let path = data_dir.join(IDENTITY_FILE);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("Failed to remove identity"),
        }
    }

    /// Check if an identity is stored.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(IDENTITY_FILE).exists()
    }

    /// Validate into an [`Identity`].
    pub fn to_identity(&self) -> Result<Identity> {
        Identity::new(self.uid.clone(), self.auth_token.clone()).context("Invalid identity file")
    }
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("uid", &self.uid)
            .field(
                "auth_token",
                &format!("[{} chars REDACTED]", self.auth_token.len()),
            )
            .field("saved_at", &self.saved_at)
            .finish()
    }
}

/// Where the active identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// `PREFSYNC_UID` / `PREFSYNC_TOKEN`.
    Environment,
    /// `identity.json`.
    File,
}

/// Resolve the active identity: environment first, then the identity file.
///
/// A missing identity is not an error; a malformed one is.
pub async fn resolve_identity(
    data_dir: &Path,
    env_uid: Option<String>,
    env_token: Option<String>,
) -> Result<Option<(Identity, IdentitySource)>> {
    if let (Some(uid), Some(token)) = (env_uid, env_token) {
        let identity = Identity::new(uid, token)
            .with_context(|| format!("Invalid {}/{}", ENV_UID, ENV_TOKEN))?;
        return Ok(Some((identity, IdentitySource::Environment)));
    }

    if !IdentityConfig::exists(data_dir) {
        return Ok(None);
    }
    let stored = IdentityConfig::load(data_dir).await?;
    Ok(Some((stored.to_identity()?, IdentitySource::File)))
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
