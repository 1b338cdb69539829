//! Test fixtures and collection helpers.
//!
//! Provides ready-made collections wired to a [`RemoteFixture`], either
//! directly or through the REST transport, and journals in temporary
//! directories.

use crate::remote::RemoteFixture;
use dualstore_core::{Attributes, EntityRecord, EntityStatus, RemoteId};
use dualstore_storage::{FileStore, InMemoryStore, LocalStore};
use dualstore_sync_engine::{DualCollection, HttpTransport, LoopbackClient, SyncConfig};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Route used by the collection helpers.
pub const TODOS_ROUTE: &str = "/todos";

/// Origin used by [`http_transport`].
pub const LOOPBACK_ORIGIN: &str = "http://remote.test";

/// REST transport talking to a [`RemoteFixture`] in-process.
pub type LoopbackTransport = HttpTransport<LoopbackClient<Arc<RemoteFixture>>>;

/// A collection over an in-memory store and a [`RemoteFixture`].
pub type MemoryCollection = DualCollection<InMemoryStore, RemoteFixture>;

/// Converts a JSON object literal into attributes.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn attrs(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        other => panic!("attributes must be a JSON object, got {other}"),
    }
}

/// Builds a delayed record as a previous session would have left it.
pub fn delayed(status: EntityStatus, remote_id: Option<u64>, attributes: Value) -> EntityRecord {
    let record = EntityRecord::new(attrs(attributes)).with_status(status);
    match remote_id {
        Some(id) => record.with_remote_id(RemoteId::Number(id)),
        None => record,
    }
}

/// Creates an empty remote collection at [`TODOS_ROUTE`].
pub fn todos_remote() -> Arc<RemoteFixture> {
    Arc::new(RemoteFixture::new(TODOS_ROUTE))
}

/// Creates a collection over a fresh in-memory store.
pub fn memory_collection(remote: &Arc<RemoteFixture>) -> MemoryCollection {
    collection_with_store(InMemoryStore::new(), remote)
}

/// Creates a collection over an in-memory store pre-filled with `records`.
///
/// # Panics
///
/// Panics if a record cannot be stored.
pub fn seeded_collection(
    records: &[EntityRecord],
    remote: &Arc<RemoteFixture>,
) -> MemoryCollection {
    let store = InMemoryStore::with_records(records).expect("Failed to seed in-memory store");
    collection_with_store(store, remote)
}

/// Creates a collection over any store, talking to `remote` directly.
pub fn collection_with_store<S: LocalStore>(
    store: S,
    remote: &Arc<RemoteFixture>,
) -> DualCollection<S, RemoteFixture> {
    DualCollection::new(
        SyncConfig::new(remote.route()),
        Arc::new(store),
        Arc::clone(remote),
    )
}

/// Creates a REST transport that serves requests from `remote`.
pub fn http_transport(remote: &Arc<RemoteFixture>) -> LoopbackTransport {
    HttpTransport::new(LOOPBACK_ORIGIN, LoopbackClient::new(Arc::clone(remote)))
}

/// A journal path in a temporary directory, removed on drop.
pub struct TempJournal {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TempJournal {
    /// Creates a fresh temporary directory for a journal.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: temp_dir.path().join("records.journal"),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the journal path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the journal, replaying whatever it already holds.
    ///
    /// # Panics
    ///
    /// Panics if the journal cannot be opened.
    pub fn open(&self) -> FileStore {
        FileStore::open_with_create_dirs(&self.path).expect("Failed to open journal")
    }
}

impl Default for TempJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attrs_accepts_objects() {
        let map = attrs(json!({"name": "a"}));
        assert_eq!(map.get("name"), Some(&json!("a")));
    }

    #[test]
    #[should_panic(expected = "JSON object")]
    fn attrs_rejects_arrays() {
        attrs(json!([1, 2]));
    }

    #[test]
    fn delayed_record_is_consistent() {
        let record = delayed(EntityStatus::UpdateFailed, Some(3), json!({"name": "a"}));
        assert!(record.check_invariants().is_ok());
        assert!(delayed(EntityStatus::CreateFailed, None, json!({}))
            .check_invariants()
            .is_ok());
    }

    #[test]
    fn journal_lives_in_temp_dir() {
        let journal = TempJournal::new();
        let store = journal.open();
        assert_eq!(store.path(), journal.path());
        assert!(journal.path().exists());
    }
}
