//! # sync-types
//!
//! Value types shared by every prefsync crate.
//!
//! - [`PreferenceRecord`] / [`PreferencePatch`] - the synchronized record and edits to it
//! - [`Origin`] - provenance tag carried by change signals
//! - [`Identity`] - the signed-in account
//! - [`PutPreferencesBody`], [`RemoteDocument`], [`extract_preferences`] - wire shapes
//! - [`TypesError`] - error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod identity;
mod origin;
mod record;
mod wire;

pub use error::TypesError;
pub use identity::Identity;
pub use origin::Origin;
pub use record::{
    PreferencePatch, PreferenceRecord, DEFAULT_CURRENCY, DEFAULT_LANGUAGE, DEFAULT_METRIC_SYSTEM,
    DEFAULT_TIMEZONE,
};
pub use wire::{extract_preferences, PutPreferencesBody, RemoteDocument, DOCUMENT_SOURCE};
