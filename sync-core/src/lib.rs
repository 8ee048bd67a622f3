//! # sync-core
//!
//! Pure logic for prefsync (no I/O, instant tests).
//!
//! This crate holds the conflict resolver and the sync engine state machine
//! without any network, disk, or timer I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (transport calls, local store writes, timers) is performed
//! by `sync-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod resolver;
pub mod state;

pub use resolver::{resolve, Resolution, Winner};
pub use state::{Action, EngineState, Event};
