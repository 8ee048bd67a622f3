//! Sync engine state machine for prefsync.
//!
//! This module provides a pure, side-effect-free state machine for the
//! local/remote reconciliation loop. It takes events as input and produces a
//! new state plus a list of actions to execute.
//!
//! The `ApplyingRemote` state is the loop-prevention guard: while a remote
//! record is being written into the local store, change signals raised by
//! that write never arm the outbound push timer.
//!
//! The actual I/O (store writes, transport calls, timers) is performed by
//! sync-client, not by this module.

use prefsync_types::{Origin, PreferenceRecord};

use crate::resolver::{resolve, Winner};

/// Engine state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Waiting for local edits or inbound records.
    #[default]
    Idle,
    /// A remote record is being written to the local store.
    ApplyingRemote,
}

impl EngineState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions in order.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Idle
            (Self::Idle, Event::LocalChanged { origin }) if origin.is_local() => {
                (Self::Idle, vec![Action::ArmPushTimer])
            }
            (Self::Idle, Event::RemoteReceived { local, remote, origin }) => {
                let resolution = resolve(&local, remote.as_ref());
                match resolution.winner {
                    Winner::Remote => {
                        // A pending push would carry the superseded local
                        // record, or the remote one back to its sender
                        let language = resolution.record.language.clone();
                        (
                            Self::ApplyingRemote,
                            vec![
                                Action::CancelPushTimer,
                                Action::WriteLocal {
                                    record: resolution.record,
                                    origin,
                                },
                                Action::ApplyLanguage { language },
                            ],
                        )
                    }
                    Winner::Local if local_is_ahead(&local, remote.as_ref()) => {
                        (Self::Idle, vec![Action::ArmPushTimer])
                    }
                    Winner::Local => (Self::Idle, vec![]),
                }
            }

            // From ApplyingRemote
            (Self::ApplyingRemote, Event::RemoteApplied) => (Self::Idle, vec![]),

            // The push timer is independent of the guard
            (state, Event::PushTimerFired) => (state, vec![Action::Push]),

            // Everything else (including any signal while ApplyingRemote)
            // leaves the state untouched and does nothing
            (state, _) => (state, vec![]),
        }
    }

    /// Check if a remote record is currently being applied.
    pub fn is_applying_remote(&self) -> bool {
        matches!(self, Self::ApplyingRemote)
    }
}

/// True if the remote side is missing information the local side has.
fn local_is_ahead(local: &PreferenceRecord, remote: Option<&PreferenceRecord>) -> bool {
    match remote {
        Some(remote) => local.updated_at_ms > remote.updated_at_ms,
        None => !local.is_unwritten(),
    }
}

/// Events fed into the engine state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A change signal was observed on the bus.
    LocalChanged {
        /// Who wrote the local store.
        origin: Origin,
    },
    /// A transport delivered a remote record (or reported none).
    RemoteReceived {
        /// Current local store value.
        local: PreferenceRecord,
        /// The remote record, if the remote side has one.
        remote: Option<PreferenceRecord>,
        /// Origin tag to use if the remote record is written locally.
        origin: Origin,
    },
    /// The remote record has been written and side effects are done.
    RemoteApplied,
    /// The debounce timer elapsed.
    PushTimerFired,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Cancel any pending push timer and start a fresh one.
    ArmPushTimer,
    /// Drop any pending push timer without starting a new one.
    CancelPushTimer,
    /// Push the current local store value to the remote.
    Push,
    /// Overwrite the local store with a remote record.
    WriteLocal {
        /// The record to store.
        record: PreferenceRecord,
        /// Origin tag for the resulting change signal.
        origin: Origin,
    },
    /// Make `language` the active UI language if it is supported and not
    /// already active.
    ApplyLanguage {
        /// Language code from the accepted record.
        language: String,
    },
}
