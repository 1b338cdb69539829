//! Collection sync state and statistics.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use std::time::Instant;

/// The current sync state of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No protocol has run yet.
    Idle,
    /// A bootstrap is running.
    Bootstrapping,
    /// A reconciliation is running.
    Reconciling,
    /// The last protocol completed.
    Synced,
    /// The last protocol failed.
    Error,
}

impl SyncState {
    /// Returns true while a protocol is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Bootstrapping | SyncState::Reconciling)
    }

    /// Returns true if a new protocol may start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed bootstraps.
    pub bootstraps: u64,
    /// Completed reconciliations.
    pub reconciliations: u64,
    /// Delayed creates replayed successfully.
    pub replayed_creates: u64,
    /// Delayed updates replayed successfully.
    pub replayed_updates: u64,
    /// Delayed deletes replayed successfully.
    pub replayed_deletes: u64,
    /// Records physically removed as settled garbage.
    pub garbage_removed: u64,
    /// Last sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Holds a collection in an active state until the protocol finishes.
///
/// Dropping the guard without finishing (the protocol future was dropped)
/// returns the collection to `Idle`.
pub(crate) struct ActiveSync<'a> {
    state: &'a RwLock<SyncState>,
    finished: bool,
}

impl<'a> ActiveSync<'a> {
    /// Moves `state` into `target`, failing if a protocol is already running.
    pub(crate) fn begin(state: &'a RwLock<SyncState>, target: SyncState) -> SyncResult<Self> {
        let mut current = state.write();
        if !current.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: *current,
                to: target,
            });
        }
        *current = target;
        Ok(Self {
            state,
            finished: false,
        })
    }

    /// Leaves the active state as `Synced` or `Error`.
    pub(crate) fn finish(mut self, succeeded: bool) {
        *self.state.write() = if succeeded {
            SyncState::Synced
        } else {
            SyncState::Error
        };
        self.finished = true;
    }
}

impl Drop for ActiveSync<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.write() = SyncState::Idle;
        }
    }
}
