//! First-sync protocol: seeds a collection from the remote snapshot.

use crate::collection::DualCollection;
use crate::error::{SyncError, SyncResult};
use crate::events::{SyncEmitter, SyncEvent};
use crate::state::{ActiveSync, SyncState};
use crate::transport::{RemoteRequest, RemoteTransport};
use dualstore_core::EntityRecord;
use dualstore_storage::LocalStore;
use futures::future::BoxFuture;
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// How a remote snapshot replaces the in-memory set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Reconcile by remote id: matched records are updated in place unless
    /// they carry pending local work, unmatched ones are added, and records
    /// missing from the snapshot are kept.
    #[default]
    Set,
    /// Discard the in-memory set and take the snapshot. Records keep the
    /// local key of a prior record with the same remote id. Records with
    /// pending local work are kept as they are, and snapshot items for them
    /// are skipped.
    Reset,
}

/// Callback invoked with the merged set before it is persisted.
pub type SuccessCallback = Arc<dyn Fn(&[EntityRecord]) + Send + Sync>;

/// Options for [`DualCollection::first_sync`].
#[derive(Clone, Default)]
pub struct FirstSyncOptions {
    /// Merge semantics.
    pub mode: MergeMode,
    on_success: Option<SuccessCallback>,
}

impl FirstSyncOptions {
    /// Creates options with `Set` semantics and no callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options with `Reset` semantics.
    pub fn reset() -> Self {
        Self::new().with_mode(MergeMode::Reset)
    }

    /// Sets the merge mode.
    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the success callback.
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[EntityRecord]) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for FirstSyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirstSyncOptions")
            .field("mode", &self.mode)
            .field("on_success", &self.on_success.is_some())
            .finish()
    }
}

/// A pending bootstrap.
///
/// Nothing runs until the handle is awaited, so subscribers attached before
/// that see every event.
///
/// # Example
///
/// ```rust
/// use dualstore_core::SyncVerb;
/// use dualstore_storage::InMemoryStore;
/// use dualstore_sync_engine::{
///     DualCollection, FirstSyncOptions, MockTransport, SyncConfig, SyncEventName,
/// };
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
/// # rt.block_on(async {
/// let transport = Arc::new(MockTransport::new());
/// transport.respond(SyncVerb::Read, json!([{"id": 1, "title": "milk"}]));
///
/// let todos = DualCollection::new(
///     SyncConfig::new("/todos"),
///     Arc::new(InMemoryStore::new()),
///     transport,
/// );
///
/// let sync = todos.first_sync(FirstSyncOptions::new());
/// let mut events = sync.subscribe();
/// let records = sync.await.unwrap();
///
/// assert_eq!(records.len(), 1);
/// assert_eq!(events.recv().await.unwrap().name(), SyncEventName::LocalSyncSuccess);
/// # });
/// ```
#[must_use = "a first sync does nothing unless awaited"]
pub struct FirstSync<'a, S: LocalStore, T: RemoteTransport> {
    collection: &'a DualCollection<S, T>,
    options: FirstSyncOptions,
    emitter: SyncEmitter,
}

impl<'a, S: LocalStore, T: RemoteTransport> FirstSync<'a, S, T> {
    /// Returns a receiver for this bootstrap's events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.emitter.subscribe()
    }

    /// Returns the emitter.
    pub fn emitter(&self) -> &SyncEmitter {
        &self.emitter
    }

    /// Returns the options.
    pub fn options(&self) -> &FirstSyncOptions {
        &self.options
    }
}

impl<'a, S: LocalStore + 'a, T: RemoteTransport + 'a> IntoFuture for FirstSync<'a, S, T> {
    type Output = SyncResult<Vec<EntityRecord>>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            self.collection
                .run_first_sync(self.options, self.emitter)
                .await
        })
    }
}

impl<S: LocalStore, T: RemoteTransport> DualCollection<S, T> {
    /// Starts a bootstrap against the remote snapshot.
    ///
    /// Returns immediately; await the handle to run it. The sequence is:
    ///
    /// 1. Reload from the local store (`LOCAL_SYNC_FAIL` stops here)
    /// 2. `read` the remote collection (`REMOTE_SYNC_FAIL` stops here,
    ///    leaving local state untouched)
    /// 3. Merge the snapshot into memory, invoke the success callback,
    ///    emit `REMOTE_SYNC_SUCCESS`
    /// 4. Persist with `save_all`, reload, emit `SYNCHRONIZED`
    pub fn first_sync(&self, options: FirstSyncOptions) -> FirstSync<'_, S, T> {
        FirstSync {
            collection: self,
            options,
            emitter: SyncEmitter::new(self.config.event_capacity),
        }
    }

    async fn run_first_sync(
        &self,
        options: FirstSyncOptions,
        emitter: SyncEmitter,
    ) -> SyncResult<Vec<EntityRecord>> {
        let active = ActiveSync::begin(&self.state, SyncState::Bootstrapping)?;
        info!(url = %self.config.url, mode = ?options.mode, "starting first sync");

        let local = match self.fetch().await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "first sync could not read the local store");
                self.record_failure(&err);
                active.finish(false);
                let err = Arc::new(err);
                emitter.emit(SyncEvent::LocalSyncFail(Arc::clone(&err)));
                return Err(SyncError::Shared(err));
            }
        };
        emitter.emit(SyncEvent::LocalSyncSuccess(local));

        let snapshot = match self
            .dispatch(RemoteRequest::read(self.config.url.clone()))
            .await
            .and_then(|response| self.parse_collection(response))
        {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(url = %self.config.url, error = %error, "first sync remote read failed");
                let err = SyncError::Remote(error.clone());
                self.record_failure(&err);
                active.finish(false);
                emitter.emit(SyncEvent::RemoteSyncFail {
                    error,
                    options: options.clone(),
                });
                return Err(err);
            }
        };

        let merged = self
            .entities
            .write()
            .merge_snapshot(snapshot, options.mode);
        if let Some(callback) = &options.on_success {
            callback(&merged);
        }
        emitter.emit(SyncEvent::RemoteSyncSuccess(merged));

        let persisted = match self.save().await {
            Ok(_) => self.fetch().await,
            Err(err) => Err(err),
        };
        match persisted {
            Ok(records) => {
                {
                    let mut stats = self.stats.write();
                    stats.bootstraps += 1;
                    stats.last_sync_time = Some(Instant::now());
                    stats.last_error = None;
                }
                active.finish(true);
                info!(records = records.len(), "first sync complete");
                emitter.emit(SyncEvent::Synchronized);
                Ok(records)
            }
            Err(err) => {
                error!(error = %err, "first sync could not persist the snapshot");
                self.record_failure(&err);
                active.finish(false);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::error::RemoteError;
    use crate::events::SyncEventName;
    use crate::transport::MockTransport;
    use dualstore_core::{EntityStatus, LocalKey, RemoteId, SyncVerb};
    use dualstore_storage::InMemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn drain(receiver: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEventName> {
        let mut names = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            names.push(event.name());
        }
        names
    }

    fn collection(store: InMemoryStore) -> DualCollection<InMemoryStore, MockTransport> {
        DualCollection::new(
            SyncConfig::new("/todos"),
            Arc::new(store),
            Arc::new(MockTransport::new()),
        )
    }

    #[tokio::test]
    async fn success_emits_every_phase_in_order() {
        let collection = collection(InMemoryStore::new());
        collection
            .transport()
            .respond(SyncVerb::Read, json!([{"id": 1, "title": "a"}, {"id": 2, "title": "b"}]));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let sync = collection.first_sync(FirstSyncOptions::new().on_success(move |records| {
            seen.store(records.len(), Ordering::SeqCst);
        }));
        let mut events = sync.subscribe();
        let records = sync.await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.local_key.is_some()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            drain(&mut events),
            vec![
                SyncEventName::LocalSyncSuccess,
                SyncEventName::RemoteSyncSuccess,
                SyncEventName::Synchronized
            ]
        );
        assert_eq!(collection.store().count().await.unwrap(), 2);
        assert_eq!(collection.state(), SyncState::Synced);
        assert_eq!(collection.stats().bootstraps, 1);
    }

    #[tokio::test]
    async fn no_event_before_await() {
        let collection = collection(InMemoryStore::new());
        let sync = collection.first_sync(FirstSyncOptions::new());
        let mut events = sync.subscribe();
        tokio::task::yield_now().await;
        assert!(drain(&mut events).is_empty());
        assert!(collection.transport().requests().is_empty());
        drop(sync);
    }

    #[tokio::test]
    async fn remote_failure_leaves_local_state() {
        let seed = EntityRecord::default()
            .with_remote_id(RemoteId::Number(1))
            .with_status(EntityStatus::Synchronized);
        let collection = collection(InMemoryStore::with_records(&[seed]).unwrap());
        collection
            .transport()
            .fail(SyncVerb::Read, RemoteError::unreachable("offline"));

        let sync = collection.first_sync(FirstSyncOptions::reset());
        let mut events = sync.subscribe();
        let result = sync.await;

        assert!(matches!(result, Err(SyncError::Remote(RemoteError::Unreachable(_)))));
        let events: Vec<SyncEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(events.len(), 2);
        match &events[1] {
            SyncEvent::RemoteSyncFail { options, .. } => assert_eq!(options.mode, MergeMode::Reset),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(collection.store().count().await.unwrap(), 1);
        assert_eq!(collection.state(), SyncState::Error);
    }

    #[tokio::test]
    async fn invalid_snapshot_is_remote_failure() {
        let collection = collection(InMemoryStore::new());
        collection.transport().respond(SyncVerb::Read, json!({"id": 1}));

        let sync = collection.first_sync(FirstSyncOptions::new());
        let mut events = sync.subscribe();
        assert!(sync.await.is_err());
        assert_eq!(
            drain(&mut events),
            vec![SyncEventName::LocalSyncSuccess, SyncEventName::RemoteSyncFail]
        );
    }

    #[tokio::test]
    async fn set_keeps_delayed_local_work() {
        let seed = vec![
            EntityRecord::default()
                .with_local_key(LocalKey::new(1))
                .with_remote_id(RemoteId::Number(10))
                .with_status(EntityStatus::UpdateFailed),
            EntityRecord::default()
                .with_local_key(LocalKey::new(2))
                .with_status(EntityStatus::CreateFailed),
        ];
        let collection = collection(InMemoryStore::with_records(&seed).unwrap());
        collection
            .transport()
            .respond(SyncVerb::Read, json!([{"id": 10, "title": "remote"}]));

        let records = collection.first_sync(FirstSyncOptions::new()).await.unwrap();

        assert_eq!(records.len(), 2);
        let kept = collection.get(LocalKey::new(1)).unwrap();
        assert_eq!(kept.status, EntityStatus::UpdateFailed);
        assert!(!kept.attributes.contains_key("title"));
    }

    #[tokio::test]
    async fn repeated_bootstrap_does_not_duplicate() {
        let collection = collection(InMemoryStore::new());
        for _ in 0..2 {
            collection
                .transport()
                .respond(SyncVerb::Read, json!([{"id": 1, "title": "a"}]));
            collection.first_sync(FirstSyncOptions::new()).await.unwrap();
        }
        assert_eq!(collection.store().count().await.unwrap(), 1);
        assert_eq!(collection.len(), 1);
    }
}
