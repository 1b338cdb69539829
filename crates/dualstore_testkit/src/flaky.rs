//! A local store wrapper that fails on demand.

use async_trait::async_trait;
use dualstore_core::{EntityRecord, LocalKey};
use dualstore_storage::{LocalStore, Scan, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// A [`LocalStore`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// [`LocalStore::put`]
    Put,
    /// [`LocalStore::get`]
    Get,
    /// [`LocalStore::iterate`]
    Iterate,
    /// [`LocalStore::remove_batch`]
    RemoveBatch,
    /// [`LocalStore::save_all`]
    SaveAll,
    /// [`LocalStore::count`]
    Count,
}

/// Wraps a store and rejects the operations it is told to fail.
///
/// Failing operations return [`StorageError::Rejected`] without touching the
/// inner store. Every call is counted, failed or not.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    failing: Mutex<HashSet<StoreOp>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
}

impl<S: LocalStore> FlakyStore<S> {
    /// Wraps `inner`; nothing fails until told to.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes `op` fail until healed.
    pub fn fail(&self, op: StoreOp) {
        self.failing.lock().insert(op);
    }

    /// Lets `op` succeed again.
    pub fn heal(&self, op: StoreOp) {
        self.failing.lock().remove(&op);
    }

    /// Lets every operation succeed again.
    pub fn heal_all(&self) {
        self.failing.lock().clear();
    }

    /// Returns how many times `op` was called.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    fn enter(&self, op: StoreOp) -> StorageResult<()> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        if self.failing.lock().contains(&op) {
            return Err(StorageError::rejected(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: LocalStore> LocalStore for FlakyStore<S> {
    async fn put(&self, record: &EntityRecord) -> StorageResult<LocalKey> {
        self.enter(StoreOp::Put)?;
        self.inner.put(record).await
    }

    async fn get(&self, key: LocalKey) -> StorageResult<Option<EntityRecord>> {
        self.enter(StoreOp::Get)?;
        self.inner.get(key).await
    }

    async fn iterate(
        &self,
        scan: &Scan,
        visit: &mut (dyn FnMut(EntityRecord) + Send),
    ) -> StorageResult<()> {
        self.enter(StoreOp::Iterate)?;
        self.inner.iterate(scan, visit).await
    }

    async fn remove_batch(&self, keys: &[LocalKey]) -> StorageResult<()> {
        self.enter(StoreOp::RemoveBatch)?;
        self.inner.remove_batch(keys).await
    }

    async fn save_all(&self, records: &[EntityRecord]) -> StorageResult<Vec<LocalKey>> {
        self.enter(StoreOp::SaveAll)?;
        self.inner.save_all(records).await
    }

    async fn count(&self) -> StorageResult<usize> {
        self.enter(StoreOp::Count)?;
        self.inner.count().await
    }
}
