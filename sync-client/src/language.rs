//! UI language side effect.
//!
//! When a remote record is accepted, the engine asks a [`LanguageApplier`]
//! to make its language active. Unsupported codes and the already-active
//! language are skipped by the engine before `apply` is called.

use std::sync::Mutex;

use thiserror::Error;

use crate::lock;

/// Language codes the stock applier accepts.
pub const DEFAULT_SUPPORTED_LANGUAGES: [&str; 3] = ["ru", "en", "ar"];

/// Errors from applying a language.
#[derive(Debug, Error)]
pub enum LanguageError {
    /// The code is not in the supported set.
    #[error("unsupported language: {0}")]
    Unsupported(String),

    /// The host failed to switch languages.
    #[error("language switch failed: {0}")]
    Failed(String),
}

/// Host hook that switches the active UI language.
pub trait LanguageApplier: Send + Sync {
    /// True if the host can display `language`.
    fn is_supported(&self, language: &str) -> bool;

    /// The language currently active, if any.
    fn current_language(&self) -> Option<String>;

    /// Make `language` the active language.
    fn apply(&self, language: &str) -> Result<(), LanguageError>;
}

/// Applier that tracks the active language against a fixed supported set.
#[derive(Debug)]
pub struct SupportedLanguages {
    supported: Vec<String>,
    current: Mutex<Option<String>>,
}

impl SupportedLanguages {
    /// Accept exactly the given codes. Codes are compared lower-case.
    pub fn new<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            supported: supported
                .into_iter()
                .map(|code| code.as_ref().trim().to_lowercase())
                .filter(|code| !code.is_empty())
                .collect(),
            current: Mutex::new(None),
        }
    }

    /// Start with `language` already active.
    pub fn with_current(self, language: impl Into<String>) -> Self {
        *lock(&self.current) = Some(language.into());
        self
    }

    /// The accepted codes.
    pub fn supported(&self) -> &[String] {
        &self.supported
    }
}

impl Default for SupportedLanguages {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPORTED_LANGUAGES)
    }
}

impl LanguageApplier for SupportedLanguages {
    fn is_supported(&self, language: &str) -> bool {
        let language = language.to_lowercase();
        self.supported.iter().any(|code| *code == language)
    }

    fn current_language(&self) -> Option<String> {
        lock(&self.current).clone()
    }

    fn apply(&self, language: &str) -> Result<(), LanguageError> {
        if !self.is_supported(language) {
            return Err(LanguageError::Unsupported(language.to_string()));
        }
        *lock(&self.current) = Some(language.to_lowercase());
        tracing::info!("Active language set to {}", language);
        Ok(())
    }
}
