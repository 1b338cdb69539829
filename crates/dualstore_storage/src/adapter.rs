//! Local store adapter trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use dualstore_core::{EntityRecord, EntityStatus, LocalKey};

/// Inclusive range over the `status` index.
///
/// Statuses are ordered as declared in [`EntityStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    lower: EntityStatus,
    upper: EntityStatus,
}

impl KeyRange {
    /// Creates a range covering `lower..=upper`.
    pub fn new(lower: EntityStatus, upper: EntityStatus) -> Self {
        Self { lower, upper }
    }

    /// Creates a range matching exactly one status.
    pub fn only(status: EntityStatus) -> Self {
        Self::new(status, status)
    }

    /// Returns the lower bound.
    pub fn lower(&self) -> EntityStatus {
        self.lower
    }

    /// Returns the upper bound.
    pub fn upper(&self) -> EntityStatus {
        self.upper
    }

    /// Returns true if `status` falls inside the range.
    pub fn contains(&self, status: EntityStatus) -> bool {
        self.lower <= status && status <= self.upper
    }
}

/// Which records an iteration visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// Every record, in ascending local key order.
    All,
    /// Records whose status falls in the range, ordered by status then key.
    ByStatus(KeyRange),
}

impl Scan {
    /// Scans every record.
    pub fn all() -> Self {
        Scan::All
    }

    /// Scans the `status` index over `range`.
    pub fn by_status(range: KeyRange) -> Self {
        Scan::ByStatus(range)
    }
}

/// A durable record store keyed by local key.
///
/// This is the only view of local persistence the sync engine has.
/// Implementations decide how records are laid out; the engine decides what
/// status they carry.
///
/// # Invariants
///
/// - `put` upserts by `local_key`, assigning a fresh key when it is absent
/// - Assigned keys are never reused, even after removal
/// - A record with status [`EntityStatus::Synchronizing`] is never persisted
/// - `remove_batch` and `save_all` are atomic
/// - Removing an absent key is not an error
///
/// # Implementors
///
/// - [`crate::InMemoryStore`] - For testing
/// - [`crate::FileStore`] - For durable storage
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Upserts a record and returns its local key.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is synchronizing, cannot be encoded,
    /// or the write fails.
    async fn put(&self, record: &EntityRecord) -> StorageResult<LocalKey>;

    /// Reads one record.
    async fn get(&self, key: LocalKey) -> StorageResult<Option<EntityRecord>>;

    /// Visits every record matched by `scan`.
    ///
    /// Returning `Ok` is the end-of-iteration signal. `visit` is never
    /// called while internal locks are held.
    async fn iterate(
        &self,
        scan: &Scan,
        visit: &mut (dyn FnMut(EntityRecord) + Send),
    ) -> StorageResult<()>;

    /// Atomically removes the given keys.
    async fn remove_batch(&self, keys: &[LocalKey]) -> StorageResult<()>;

    /// Atomically upserts every record and returns their keys in input order.
    async fn save_all(&self, records: &[EntityRecord]) -> StorageResult<Vec<LocalKey>>;

    /// Returns the number of stored records, retained tombstones included.
    async fn count(&self) -> StorageResult<usize>;

    /// Collects the records matched by `scan`.
    async fn scan(&self, scan: &Scan) -> StorageResult<Vec<EntityRecord>> {
        let mut records = Vec::new();
        self.iterate(scan, &mut |record| records.push(record)).await?;
        Ok(records)
    }
}
