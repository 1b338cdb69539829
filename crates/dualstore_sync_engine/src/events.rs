//! Lifecycle events emitted by a bootstrap.

use crate::bootstrap::FirstSyncOptions;
use crate::error::{RemoteError, SyncError};
use dualstore_core::EntityRecord;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Name of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEventName {
    /// Reading the local store failed.
    LocalSyncFail,
    /// The local snapshot was read.
    LocalSyncSuccess,
    /// The remote `read` failed.
    RemoteSyncFail,
    /// The remote snapshot was merged into memory.
    RemoteSyncSuccess,
    /// The merged snapshot is durable and reloaded.
    Synchronized,
}

impl SyncEventName {
    /// Returns the wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEventName::LocalSyncFail => "LOCAL_SYNC_FAIL",
            SyncEventName::LocalSyncSuccess => "LOCAL_SYNC_SUCCESS",
            SyncEventName::RemoteSyncFail => "REMOTE_SYNC_FAIL",
            SyncEventName::RemoteSyncSuccess => "REMOTE_SYNC_SUCCESS",
            SyncEventName::Synchronized => "SYNCHRONIZED",
        }
    }
}

impl fmt::Display for SyncEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event with its payload.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Reading the local store failed. Nothing remote was attempted.
    LocalSyncFail(Arc<SyncError>),
    /// The local snapshot, as read.
    LocalSyncSuccess(Vec<EntityRecord>),
    /// The remote `read` failed. Local state is unchanged.
    RemoteSyncFail {
        /// The remote failure.
        error: RemoteError,
        /// Options the bootstrap was started with.
        options: FirstSyncOptions,
    },
    /// The in-memory set after merging the remote snapshot.
    RemoteSyncSuccess(Vec<EntityRecord>),
    /// The merged snapshot was persisted and reloaded.
    Synchronized,
}

impl SyncEvent {
    /// Returns the event name.
    pub fn name(&self) -> SyncEventName {
        match self {
            SyncEvent::LocalSyncFail(_) => SyncEventName::LocalSyncFail,
            SyncEvent::LocalSyncSuccess(_) => SyncEventName::LocalSyncSuccess,
            SyncEvent::RemoteSyncFail { .. } => SyncEventName::RemoteSyncFail,
            SyncEvent::RemoteSyncSuccess(_) => SyncEventName::RemoteSyncSuccess,
            SyncEvent::Synchronized => SyncEventName::Synchronized,
        }
    }
}

/// Publish side of one bootstrap's event stream.
///
/// Events are not persisted: a receiver sees only what is emitted after it
/// subscribed.
#[derive(Debug, Clone)]
pub struct SyncEmitter {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEmitter {
    /// Creates an emitter buffering up to `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns a receiver for events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Emits an event to every current subscriber.
    pub fn emit(&self, event: SyncEvent) {
        let name = event.name();
        // No subscribers is not an error
        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(event = %name, receivers, "emitted sync event");
    }

    /// Returns the number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
