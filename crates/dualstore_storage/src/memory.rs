//! In-memory local store for testing.

use crate::adapter::{LocalStore, Scan};
use crate::error::StorageResult;
use crate::table::Table;
use async_trait::async_trait;
use dualstore_core::{EntityRecord, LocalKey};
use parking_lot::RwLock;
use tracing::debug;

/// An in-memory local store.
///
/// This store keeps every record in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral collections that don't need persistence
///
/// Records are held CBOR-encoded, exactly as a durable adapter would store
/// them, so codec problems surface here too.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks.
///
/// # Example
///
/// ```rust
/// use dualstore_core::EntityRecord;
/// use dualstore_storage::{InMemoryStore, LocalStore};
///
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let store = InMemoryStore::new();
/// let key = store.put(&EntityRecord::default()).await.unwrap();
/// assert_eq!(key.as_u64(), 1);
/// assert_eq!(store.count().await.unwrap(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    table: RwLock<Table>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with records.
    ///
    /// Useful for seeding test scenarios. Records keep their local keys when
    /// they have one.
    pub fn with_records(records: &[EntityRecord]) -> StorageResult<Self> {
        let mut table = Table::default();
        for row in table.prepare_all(records)? {
            table.apply(row);
        }
        Ok(Self {
            table: RwLock::new(table),
        })
    }

    /// Returns a copy of every stored record.
    pub fn records(&self) -> StorageResult<Vec<EntityRecord>> {
        self.table.read().records()
    }

    /// Removes every record. The key counter is not reset.
    pub fn clear(&self) {
        self.table.write().clear();
    }
}

#[async_trait]
impl LocalStore for InMemoryStore {
    async fn put(&self, record: &EntityRecord) -> StorageResult<LocalKey> {
        let mut table = self.table.write();
        let row = table.prepare(record)?;
        let key = row.key();
        table.apply(row);
        debug!(local_key = %key, status = %record.status, "put record");
        Ok(key)
    }

    async fn get(&self, key: LocalKey) -> StorageResult<Option<EntityRecord>> {
        self.table.read().get(key)
    }

    async fn iterate(
        &self,
        scan: &Scan,
        visit: &mut (dyn FnMut(EntityRecord) + Send),
    ) -> StorageResult<()> {
        let records = self.table.read().collect(scan)?;
        for record in records {
            visit(record);
        }
        Ok(())
    }

    async fn remove_batch(&self, keys: &[LocalKey]) -> StorageResult<()> {
        let removed = self.table.write().remove(keys);
        debug!(requested = keys.len(), removed, "removed batch");
        Ok(())
    }

    async fn save_all(&self, records: &[EntityRecord]) -> StorageResult<Vec<LocalKey>> {
        let mut table = self.table.write();
        let rows = table.prepare_all(records)?;
        let keys: Vec<LocalKey> = rows.iter().map(|row| row.key()).collect();
        for row in rows {
            table.apply(row);
        }
        debug!(count = keys.len(), "saved all records");
        Ok(keys)
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.table.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::KeyRange;
    use crate::error::StorageError;
    use dualstore_core::{EntityStatus, RemoteId};
    use proptest::prelude::*;

    fn record(status: EntityStatus) -> EntityRecord {
        let record = EntityRecord::default().with_status(status);
        match status {
            EntityStatus::UpdateFailed | EntityStatus::DeleteFailed => {
                record.with_remote_id(RemoteId::Number(1))
            }
            _ => record,
        }
    }

    #[tokio::test]
    async fn put_assigns_key_and_get_returns_it() {
        let store = InMemoryStore::new();
        let key = store.put(&record(EntityStatus::CreateFailed)).await.unwrap();

        let stored = store.get(key).await.unwrap().unwrap();
        assert_eq!(stored.local_key, Some(key));
        assert_eq!(stored.status, EntityStatus::CreateFailed);
    }

    #[tokio::test]
    async fn put_upserts_by_key() {
        let store = InMemoryStore::new();
        let key = store.put(&record(EntityStatus::CreateFailed)).await.unwrap();

        let updated = record(EntityStatus::Synchronized).with_local_key(key);
        assert_eq!(store.put(&updated).await.unwrap(), key);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn put_rejects_synchronizing() {
        let store = InMemoryStore::new();
        let result = store.put(&record(EntityStatus::Synchronizing)).await;
        assert!(matches!(result, Err(StorageError::TransientStatus { .. })));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn iterate_by_status_range() {
        let store = InMemoryStore::new();
        for status in EntityStatus::ALL {
            if status.is_persistable() {
                store.put(&record(status)).await.unwrap();
            }
        }

        let delayed = store
            .scan(&Scan::by_status(KeyRange::new(
                EntityStatus::CreateFailed,
                EntityStatus::DeleteFailed,
            )))
            .await
            .unwrap();
        assert_eq!(delayed.len(), 3);
        assert!(delayed.iter().all(EntityRecord::is_delayed));

        let mut visited = 0;
        store
            .iterate(&Scan::all(), &mut |_: EntityRecord| visited += 1)
            .await
            .unwrap();
        assert_eq!(visited, 4);
    }

    #[tokio::test]
    async fn keys_are_never_reused() {
        let store = InMemoryStore::new();
        let first = store.put(&record(EntityStatus::Synchronized)).await.unwrap();
        store.remove_batch(&[first]).await.unwrap();
        let second = store.put(&record(EntityStatus::Synchronized)).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn save_all_is_atomic() {
        let store = InMemoryStore::new();
        let records = vec![
            record(EntityStatus::Synchronized),
            record(EntityStatus::Synchronizing),
        ];
        assert!(store.save_all(&records).await.is_err());
        assert_eq!(store.count().await.unwrap(), 0);

        let keys = store
            .save_all(&[record(EntityStatus::Synchronized), record(EntityStatus::CreateFailed)])
            .await
            .unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn clear_keeps_counter() {
        let store = InMemoryStore::with_records(&[
            record(EntityStatus::Synchronized).with_local_key(LocalKey::new(5)),
        ])
        .unwrap();
        store.clear();
        assert_eq!(store.count().await.unwrap(), 0);
        let key = store.put(&record(EntityStatus::Synchronized)).await.unwrap();
        assert_eq!(key, LocalKey::new(6));
    }

    proptest! {
        #[test]
        fn removing_twice_equals_removing_once(
            count in 1usize..12,
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let seed: Vec<EntityRecord> = (0..count)
                    .map(|_| record(EntityStatus::DeleteFailed))
                    .collect();
                let once = InMemoryStore::with_records(&seed).unwrap();
                let twice = InMemoryStore::with_records(&seed).unwrap();
                let keys: Vec<LocalKey> = picks
                    .iter()
                    .map(|index| LocalKey::new(index.index(count) as u64 + 1))
                    .collect();

                once.remove_batch(&keys).await.unwrap();
                twice.remove_batch(&keys).await.unwrap();
                twice.remove_batch(&keys).await.unwrap();

                assert_eq!(once.records().unwrap(), twice.records().unwrap());
            });
        }
    }
}
