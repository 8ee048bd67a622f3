//! Error types for prefsync value types.

use thiserror::Error;

/// Errors raised while building prefsync types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A change-signal origin tag was not recognized.
    #[error("unknown origin: {0}")]
    UnknownOrigin(String),

    /// An identity was missing a required part.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
}
