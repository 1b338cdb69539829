//! The dual-storage collection.

use crate::bootstrap::MergeMode;
use crate::config::SyncConfig;
use crate::error::{RemoteError, RemoteResult, SyncError, SyncResult};
use crate::merge::MergeHooks;
use crate::state::{SyncState, SyncStats};
use crate::transport::{RemoteRequest, RemoteTransport};
use dualstore_core::{
    Attributes, CoreError, EntityRecord, EntityStatus, FailedStatus, LocalKey, RemoteId, SyncVerb,
    STATUS_FIELD,
};
use dualstore_storage::{KeyRange, LocalStore, Scan};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a create, update or destroy that also went to the remote store.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The remote store confirmed the write.
    Synchronized(EntityRecord),
    /// The write is stored locally and marked for replay.
    Delayed {
        /// The record as persisted, with its `*_FAILED` status.
        record: EntityRecord,
        /// Why the remote call failed.
        error: RemoteError,
    },
    /// The record no longer exists locally.
    Removed(LocalKey),
}

impl WriteOutcome {
    /// Returns true if the write still has to be replayed.
    pub fn is_delayed(&self) -> bool {
        matches!(self, WriteOutcome::Delayed { .. })
    }

    /// Returns the resulting record, if it still exists.
    pub fn record(&self) -> Option<&EntityRecord> {
        match self {
            WriteOutcome::Synchronized(record) | WriteOutcome::Delayed { record, .. } => {
                Some(record)
            }
            WriteOutcome::Removed(_) => None,
        }
    }
}

/// Result of a local-only destroy.
#[derive(Debug, Clone, PartialEq)]
pub enum DestroyOutcome {
    /// The record was never persisted; nothing was done.
    NotPersisted,
    /// The record is retained as a `DeleteFailed` tombstone until the
    /// remote delete is confirmed.
    Retained(EntityRecord),
    /// The record never reached the remote store and was removed outright.
    Removed(LocalKey),
}

/// In-memory view of the collection.
#[derive(Debug, Default)]
pub(crate) struct Entities {
    keyed: BTreeMap<LocalKey, EntityRecord>,
    /// Records merged from a snapshot but not yet saved.
    unsaved: Vec<EntityRecord>,
    /// Remote ids of locally retained tombstones.
    pending_deletes: HashSet<RemoteId>,
}

impl Entities {
    fn all(&self) -> Vec<EntityRecord> {
        self.keyed
            .values()
            .chain(self.unsaved.iter())
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.keyed.len() + self.unsaved.len()
    }

    fn insert(&mut self, record: EntityRecord) {
        match record.local_key {
            Some(key) => {
                self.keyed.insert(key, record);
            }
            None => self.unsaved.push(record),
        }
    }

    fn remove(&mut self, key: LocalKey) {
        self.keyed.remove(&key);
    }

    fn replace(&mut self, records: Vec<EntityRecord>, pending_deletes: HashSet<RemoteId>) {
        self.keyed.clear();
        self.unsaved.clear();
        for record in records {
            self.insert(record);
        }
        self.pending_deletes = pending_deletes;
    }

    pub(crate) fn set_status(&mut self, key: LocalKey, status: EntityStatus) {
        if let Some(record) = self.keyed.get_mut(&key) {
            record.status = status;
        }
    }

    /// Merges a remote snapshot and returns the resulting set.
    ///
    /// Snapshot items matching a retained tombstone are skipped in both
    /// modes: the pending local delete wins until reconciliation. Delayed
    /// and synchronizing records are never overwritten either.
    pub(crate) fn merge_snapshot(
        &mut self,
        snapshot: Vec<EntityRecord>,
        mode: MergeMode,
    ) -> Vec<EntityRecord> {
        let pending = &self.pending_deletes;
        let snapshot: Vec<EntityRecord> = snapshot
            .into_iter()
            .filter(|record| {
                record
                    .remote_id
                    .as_ref()
                    .map_or(true, |id| !pending.contains(id))
            })
            .collect();

        match mode {
            MergeMode::Set => {
                let index: HashMap<RemoteId, LocalKey> = self
                    .keyed
                    .iter()
                    .filter_map(|(key, record)| record.remote_id.clone().map(|id| (id, *key)))
                    .collect();
                let mut merged: Vec<EntityRecord> = Vec::new();
                let mut added: HashMap<RemoteId, usize> = HashMap::new();
                for incoming in snapshot {
                    let known = incoming.remote_id.as_ref().and_then(|id| index.get(id));
                    match known.and_then(|key| self.keyed.get(key)) {
                        Some(current) if has_pending_work(current) => {}
                        Some(current) => {
                            let mut updated = current.clone();
                            updated.attributes = incoming.attributes;
                            updated.remote_id = incoming.remote_id;
                            updated.status = EntityStatus::Synchronized;
                            merged.push(updated);
                        }
                        None => {
                            // A repeated id within one snapshot: last one wins.
                            if let Some(&position) =
                                incoming.remote_id.as_ref().and_then(|id| added.get(id))
                            {
                                merged[position] = incoming;
                                continue;
                            }
                            let existing = self.unsaved.iter().position(|record| {
                                record.remote_id.is_some() && record.remote_id == incoming.remote_id
                            });
                            match existing {
                                Some(position) => self.unsaved[position] = incoming,
                                None => {
                                    if let Some(id) = &incoming.remote_id {
                                        added.insert(id.clone(), merged.len());
                                    }
                                    merged.push(incoming);
                                }
                            }
                        }
                    }
                }
                for record in merged {
                    self.insert(record);
                }
            }
            MergeMode::Reset => {
                let kept: Vec<EntityRecord> = self
                    .keyed
                    .values()
                    .filter(|record| has_pending_work(record))
                    .cloned()
                    .collect();
                let protected: HashSet<RemoteId> = kept
                    .iter()
                    .filter_map(|record| record.remote_id.clone())
                    .collect();
                let prior: HashMap<RemoteId, LocalKey> = self
                    .keyed
                    .iter()
                    .filter_map(|(key, record)| record.remote_id.clone().map(|id| (id, *key)))
                    .collect();
                let incoming: Vec<EntityRecord> = snapshot
                    .into_iter()
                    .filter(|record| {
                        record
                            .remote_id
                            .as_ref()
                            .map_or(true, |id| !protected.contains(id))
                    })
                    .map(|mut record| {
                        record.local_key = record
                            .remote_id
                            .as_ref()
                            .and_then(|id| prior.get(id).copied());
                        record
                    })
                    .collect();
                self.keyed.clear();
                self.unsaved.clear();
                for record in kept.into_iter().chain(incoming) {
                    self.insert(record);
                }
            }
        }
        self.all()
    }
}

/// Delayed or mid-call records must not be overwritten by a remote snapshot.
fn has_pending_work(record: &EntityRecord) -> bool {
    record.is_delayed() || record.is_in_synchronizing()
}

/// A collection of entities kept in a local store and a remote store at once.
///
/// Writes always land in the local store first, with a pessimistic
/// `*_FAILED` status that is cleared only once the remote store confirms.
/// Records whose remote write failed stay delayed until
/// [`DualCollection::full_sync`] replays them.
///
/// # Caller obligations
///
/// The collection does not serialize overlapping writes to one record.
/// Racing two operations on the same record has undefined results.
pub struct DualCollection<S: LocalStore, T: RemoteTransport> {
    pub(crate) config: SyncConfig,
    pub(crate) store: Arc<S>,
    pub(crate) transport: Arc<T>,
    pub(crate) hooks: MergeHooks,
    pub(crate) entities: RwLock<Entities>,
    pub(crate) state: RwLock<SyncState>,
    pub(crate) stats: RwLock<SyncStats>,
}

impl<S: LocalStore, T: RemoteTransport> DualCollection<S, T> {
    /// Creates a collection over a local store and a remote transport.
    pub fn new(config: SyncConfig, store: Arc<S>, transport: Arc<T>) -> Self {
        Self {
            config,
            store,
            transport,
            hooks: MergeHooks::default(),
            entities: RwLock::new(Entities::default()),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Replaces the merge hooks.
    pub fn with_merge_hooks(mut self, hooks: MergeHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the remote transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Returns true if the transport believes the remote store is reachable.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    // ----- in-memory reads -----

    /// Returns the in-memory copy of a record.
    pub fn get(&self, key: LocalKey) -> Option<EntityRecord> {
        self.entities.read().keyed.get(&key).cloned()
    }

    /// Returns every in-memory record.
    pub fn records(&self) -> Vec<EntityRecord> {
        self.entities.read().all()
    }

    /// Returns the number of in-memory records.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if the in-memory set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ----- local write path -----

    /// Stores a new record as `CreateFailed` and returns it with its key.
    ///
    /// Nothing is sent to the remote store.
    pub async fn store_create(&self, attributes: Attributes) -> SyncResult<EntityRecord> {
        let mut record = EntityRecord::new(self.local_attributes(attributes))
            .with_status(EntityStatus::CreateFailed);
        let key = self.store.put(&record).await?;
        record.local_key = Some(key);
        self.entities.write().insert(record.clone());
        debug!(local_key = %key, "stored new record");
        Ok(record)
    }

    /// Stores a changed record.
    ///
    /// A record known remotely becomes `UpdateFailed`. One that never
    /// reached the remote store stays `CreateFailed`.
    pub async fn store_update(&self, mut record: EntityRecord) -> SyncResult<EntityRecord> {
        record.attributes.shift_remove(STATUS_FIELD);
        record.status = if record.has_remote_id() {
            EntityStatus::UpdateFailed
        } else {
            EntityStatus::CreateFailed
        };
        let key = self.store.put(&record).await?;
        record.local_key = Some(key);
        self.entities.write().insert(record.clone());
        debug!(local_key = %key, status = %record.status, "stored updated record");
        Ok(record)
    }

    /// Destroys a record locally.
    ///
    /// A record known remotely is kept as a `DeleteFailed` tombstone and
    /// hidden from reads. One that never reached the remote store is removed.
    pub async fn store_destroy(&self, mut record: EntityRecord) -> SyncResult<DestroyOutcome> {
        let Some(key) = record.local_key else {
            return Ok(DestroyOutcome::NotPersisted);
        };

        match record.remote_id.clone() {
            Some(remote_id) => {
                record.status = EntityStatus::DeleteFailed;
                self.store.put(&record).await?;
                {
                    let mut entities = self.entities.write();
                    entities.remove(key);
                    entities.pending_deletes.insert(remote_id);
                }
                debug!(local_key = %key, "retained tombstone");
                Ok(DestroyOutcome::Retained(record))
            }
            None => {
                self.store.remove_batch(&[key]).await?;
                self.entities.write().remove(key);
                debug!(local_key = %key, "removed record unknown to the remote store");
                Ok(DestroyOutcome::Removed(key))
            }
        }
    }

    /// Reads every record except retained tombstones from the local store.
    pub async fn get_all(&self) -> SyncResult<Vec<EntityRecord>> {
        Ok(self.load().await?.0)
    }

    async fn load(&self) -> SyncResult<(Vec<EntityRecord>, HashSet<RemoteId>)> {
        let mut visible = Vec::new();
        let mut pending_deletes = HashSet::new();
        self.store
            .iterate(&Scan::all(), &mut |record: EntityRecord| {
                if record.status == EntityStatus::DeleteFailed {
                    if let Some(id) = record.remote_id {
                        pending_deletes.insert(id);
                    }
                } else {
                    visible.push(record);
                }
            })
            .await?;
        Ok((visible, pending_deletes))
    }

    // ----- dual write path -----

    /// Creates a record locally, then remotely.
    ///
    /// A local failure is an error and nothing remote is attempted. A remote
    /// failure is not: the record stays `CreateFailed` and the outcome is
    /// [`WriteOutcome::Delayed`].
    pub async fn create(&self, attributes: Attributes) -> SyncResult<WriteOutcome> {
        let record = self.store_create(attributes).await?;
        self.push_write(record, SyncVerb::Create).await
    }

    /// Merges `attributes` into a record, locally then remotely.
    ///
    /// A record that never reached the remote store is sent as a create.
    pub async fn update(&self, key: LocalKey, attributes: Attributes) -> SyncResult<WriteOutcome> {
        let mut record = self.get(key).ok_or(SyncError::UnknownEntity(key))?;
        for (name, value) in self.local_attributes(attributes) {
            record.attributes.insert(name, value);
        }
        let record = self.store_update(record).await?;
        let verb = if record.has_remote_id() {
            SyncVerb::Update
        } else {
            SyncVerb::Create
        };
        self.push_write(record, verb).await
    }

    /// Destroys a record locally, then remotely.
    pub async fn destroy(&self, key: LocalKey) -> SyncResult<WriteOutcome> {
        let record = self.get(key).ok_or(SyncError::UnknownEntity(key))?;
        match self.store_destroy(record).await? {
            DestroyOutcome::Retained(record) => self.push_write(record, SyncVerb::Delete).await,
            DestroyOutcome::Removed(key) => Ok(WriteOutcome::Removed(key)),
            DestroyOutcome::NotPersisted => Err(SyncError::UnknownEntity(key)),
        }
    }

    async fn push_write(&self, record: EntityRecord, verb: SyncVerb) -> SyncResult<WriteOutcome> {
        let key = require_local_key(&record)?;
        let request = RemoteRequest::for_record(
            &record,
            verb,
            &self.config.url,
            &self.config.remote_id_attribute,
        );

        self.entities
            .write()
            .set_status(key, EntityStatus::Synchronizing);
        let response = match self.dispatch(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    local_key = %key,
                    verb = %verb,
                    error = %error,
                    "remote write failed, record left delayed"
                );
                self.entities.write().set_status(key, record.status);
                return Ok(WriteOutcome::Delayed { record, error });
            }
        };

        if verb == SyncVerb::Delete {
            self.store.remove_batch(&[key]).await?;
            if let Some(id) = &record.remote_id {
                self.entities.write().pending_deletes.remove(id);
            }
            return Ok(WriteOutcome::Removed(key));
        }

        let failed_status = record.status;
        match self.settle_write(record, response).await {
            Ok(settled) => Ok(WriteOutcome::Synchronized(settled)),
            Err(err) => {
                self.entities.write().set_status(key, failed_status);
                Err(err)
            }
        }
    }

    /// Merges a confirmed create/update response and persists the result as
    /// `Synchronized` under the record's own local key.
    pub(crate) async fn settle_write(
        &self,
        mut record: EntityRecord,
        response: Value,
    ) -> SyncResult<EntityRecord> {
        let merged = self.hooks.merge_full_sync(response);
        record.apply_wire_payload(merged, &self.config.remote_id_attribute)?;
        record.status = EntityStatus::Synchronized;
        self.store.put(&record).await?;
        self.entities.write().insert(record.clone());
        Ok(record)
    }

    /// Sends one request, bounded by the configured dispatch timeout.
    pub(crate) async fn dispatch(&self, request: RemoteRequest) -> RemoteResult<Value> {
        debug!(verb = %request.verb, url = %request.url, "dispatching remote call");
        match self.config.dispatch_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.transport.dispatch(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(RemoteError::Timeout(limit)),
                }
            }
            None => self.transport.dispatch(request).await,
        }
    }

    fn local_attributes(&self, mut attributes: Attributes) -> Attributes {
        attributes.shift_remove(STATUS_FIELD);
        attributes.shift_remove(&self.config.remote_id_attribute);
        attributes
    }

    // ----- collection persistence -----

    /// Reloads the in-memory set from the local store.
    pub async fn fetch(&self) -> SyncResult<Vec<EntityRecord>> {
        let (records, pending_deletes) = self.load().await?;
        self.entities
            .write()
            .replace(records.clone(), pending_deletes);
        Ok(records)
    }

    /// Persists the whole in-memory set and writes back assigned keys.
    pub async fn save(&self) -> SyncResult<Vec<LocalKey>> {
        let mut records = self.records();
        let keys = self.store.save_all(&records).await?;
        for (record, key) in records.iter_mut().zip(&keys) {
            record.local_key = Some(*key);
        }
        {
            let mut entities = self.entities.write();
            entities.keyed.clear();
            entities.unsaved.clear();
            for record in records {
                entities.insert(record);
            }
        }
        debug!(count = keys.len(), "saved collection");
        Ok(keys)
    }

    /// Returns every delayed record.
    ///
    /// Runs one status range scan per failure kind and unions the results,
    /// de-duplicated by local key.
    pub async fn get_delayed_data(&self) -> SyncResult<Vec<EntityRecord>> {
        let mut seen = BTreeSet::new();
        let mut delayed = Vec::new();
        for failed in FailedStatus::SCAN_ORDER {
            let range = KeyRange::only(EntityStatus::from(failed));
            for record in self.store.scan(&Scan::by_status(range)).await? {
                if record.local_key.map_or(true, |key| seen.insert(key)) {
                    delayed.push(record);
                }
            }
        }
        Ok(delayed)
    }

    /// Physically removes settled records in one batch.
    ///
    /// Records without a local key are skipped; an empty set completes
    /// without touching the store. Returns the number of keys removed.
    pub async fn remove_garbage(&self, records: &[EntityRecord]) -> SyncResult<usize> {
        let keys: Vec<LocalKey> = records.iter().filter_map(|r| r.local_key).collect();
        if keys.is_empty() {
            return Ok(0);
        }
        self.store.remove_batch(&keys).await?;
        {
            let mut entities = self.entities.write();
            for key in &keys {
                entities.remove(*key);
            }
            for id in records.iter().filter_map(|r| r.remote_id.as_ref()) {
                entities.pending_deletes.remove(id);
            }
        }
        self.stats.write().garbage_removed += keys.len() as u64;
        debug!(count = keys.len(), "removed garbage");
        Ok(keys.len())
    }

    /// Unwraps and decodes a collection `read` response.
    pub(crate) fn parse_collection(&self, response: Value) -> RemoteResult<Vec<EntityRecord>> {
        let body = match (&self.config.response_envelope, response) {
            (Some(envelope), Value::Object(mut map)) => {
                map.shift_remove(envelope.as_str()).ok_or_else(|| {
                    RemoteError::invalid_response(format!("missing `{envelope}` envelope"))
                })?
            }
            (Some(envelope), _) => {
                return Err(RemoteError::invalid_response(format!(
                    "expected an object with `{envelope}`"
                )))
            }
            (None, body) => body,
        };
        let Value::Array(items) = body else {
            return Err(RemoteError::invalid_response("expected an array of entities"));
        };

        self.hooks
            .merge_first_sync(items)
            .into_iter()
            .map(|item| {
                EntityRecord::from_wire_payload(item, &self.config.remote_id_attribute)
                    .map_err(|e| RemoteError::invalid_response(e.to_string()))
            })
            .collect()
    }

    pub(crate) fn record_failure(&self, error: &SyncError) {
        self.stats.write().last_error = Some(error.to_string());
    }
}

fn require_local_key(record: &EntityRecord) -> SyncResult<LocalKey> {
    record.local_key.ok_or_else(|| {
        SyncError::Invariant(CoreError::invariant(
            None,
            record.status,
            "record has no local key",
        ))
    })
}
