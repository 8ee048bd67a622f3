//! Signed-in account identity.

use std::fmt;

use crate::TypesError;

/// The account whose preferences are being synchronized.
///
/// The credential is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    uid: String,
    auth_token: String,
}

impl Identity {
    /// Create an identity. Both parts must be non-empty.
    pub fn new(uid: impl Into<String>, auth_token: impl Into<String>) -> Result<Self, TypesError> {
        let uid = uid.into();
        let auth_token = auth_token.into();
        if uid.trim().is_empty() {
            return Err(TypesError::InvalidIdentity("uid is empty".into()));
        }
        if auth_token.trim().is_empty() {
            return Err(TypesError::InvalidIdentity("auth token is empty".into()));
        }
        Ok(Self { uid, auth_token })
    }

    /// Account id.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Bearer credential.
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("uid", &self.uid)
            .field(
                "auth_token",
                &format!("[{} chars REDACTED]", self.auth_token.len()),
            )
            .finish()
    }
}
