//! In-memory record table with a status index, shared by the adapters.

use crate::adapter::Scan;
use crate::error::{StorageError, StorageResult};
use dualstore_core::{decode_record, encode_record, EntityRecord, EntityStatus, LocalKey};
use std::collections::{BTreeMap, BTreeSet};

/// First key handed out by an empty table.
pub(crate) const FIRST_KEY: LocalKey = LocalKey::new(1);

#[derive(Debug, Clone)]
struct Row {
    status: EntityStatus,
    bytes: Vec<u8>,
}

/// A record validated, keyed and encoded, ready to be applied.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRow {
    pub(crate) record: EntityRecord,
    key: LocalKey,
    status: EntityStatus,
    bytes: Vec<u8>,
}

impl PreparedRow {
    pub(crate) fn key(&self) -> LocalKey {
        self.key
    }
}

/// Primary table plus `(status, key)` index.
///
/// Writes are two-phase: `prepare` validates and encodes without touching
/// rows, `apply` commits. Adapters put their durability step in between.
#[derive(Debug)]
pub(crate) struct Table {
    rows: BTreeMap<LocalKey, Row>,
    by_status: BTreeSet<(EntityStatus, LocalKey)>,
    next_key: LocalKey,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            by_status: BTreeSet::new(),
            next_key: FIRST_KEY,
        }
    }
}

impl Table {
    pub(crate) fn next_key(&self) -> LocalKey {
        self.next_key
    }

    /// Raises the key counter so that `key` is never handed out again.
    pub(crate) fn reserve_through(&mut self, key: LocalKey) {
        if key >= self.next_key {
            self.next_key = key.next();
        }
    }

    pub(crate) fn set_next_key(&mut self, key: LocalKey) {
        if key > self.next_key {
            self.next_key = key;
        }
    }

    pub(crate) fn prepare(&mut self, record: &EntityRecord) -> StorageResult<PreparedRow> {
        if !record.status.is_persistable() {
            return Err(StorageError::TransientStatus {
                local_key: record.local_key,
            });
        }
        let key = match record.local_key {
            Some(key) => {
                self.reserve_through(key);
                key
            }
            None => {
                let key = self.next_key;
                self.next_key = key.next();
                key
            }
        };
        let mut stored = record.clone();
        stored.local_key = Some(key);
        let bytes = encode_record(&stored)?;
        Ok(PreparedRow {
            status: stored.status,
            record: stored,
            key,
            bytes,
        })
    }

    pub(crate) fn prepare_all(
        &mut self,
        records: &[EntityRecord],
    ) -> StorageResult<Vec<PreparedRow>> {
        records.iter().map(|record| self.prepare(record)).collect()
    }

    pub(crate) fn apply(&mut self, row: PreparedRow) {
        if let Some(old) = self.rows.remove(&row.key) {
            self.by_status.remove(&(old.status, row.key));
        }
        self.by_status.insert((row.status, row.key));
        self.rows.insert(
            row.key,
            Row {
                status: row.status,
                bytes: row.bytes,
            },
        );
    }

    pub(crate) fn remove(&mut self, keys: &[LocalKey]) -> usize {
        let mut removed = 0;
        for key in keys {
            if let Some(old) = self.rows.remove(key) {
                self.by_status.remove(&(old.status, *key));
                removed += 1;
            }
        }
        removed
    }

    /// Drops every row; the key counter keeps its value.
    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.by_status.clear();
    }

    pub(crate) fn get(&self, key: LocalKey) -> StorageResult<Option<EntityRecord>> {
        self.rows
            .get(&key)
            .map(|row| decode_record(&row.bytes).map_err(StorageError::from))
            .transpose()
    }

    /// Decodes the matched records. Callers visit them after releasing locks.
    pub(crate) fn collect(&self, scan: &Scan) -> StorageResult<Vec<EntityRecord>> {
        match scan {
            Scan::All => self
                .rows
                .values()
                .map(|row| decode_record(&row.bytes).map_err(StorageError::from))
                .collect(),
            Scan::ByStatus(range) => {
                if range.lower() > range.upper() {
                    return Ok(Vec::new());
                }
                let start = (range.lower(), LocalKey::new(0));
                let end = (range.upper(), LocalKey::new(u64::MAX));
                self.by_status
                    .range(start..=end)
                    .filter_map(|(_, key)| self.rows.get(key))
                    .map(|row| decode_record(&row.bytes).map_err(StorageError::from))
                    .collect()
            }
        }
    }

    pub(crate) fn records(&self) -> StorageResult<Vec<EntityRecord>> {
        self.collect(&Scan::All)
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::KeyRange;

    fn record(status: EntityStatus) -> EntityRecord {
        EntityRecord::default().with_status(status)
    }

    #[test]
    fn assigns_increasing_keys_from_one() {
        let mut table = Table::default();
        let a = table.prepare(&record(EntityStatus::Synchronized)).unwrap();
        let b = table.prepare(&record(EntityStatus::Synchronized)).unwrap();
        assert_eq!(a.key(), LocalKey::new(1));
        assert_eq!(b.key(), LocalKey::new(2));
    }

    #[test]
    fn explicit_key_reserves_counter() {
        let mut table = Table::default();
        let row = table
            .prepare(&record(EntityStatus::Synchronized).with_local_key(LocalKey::new(10)))
            .unwrap();
        table.apply(row);
        let next = table.prepare(&record(EntityStatus::Synchronized)).unwrap();
        assert_eq!(next.key(), LocalKey::new(11));
    }

    #[test]
    fn apply_moves_index_entry() {
        let mut table = Table::default();
        let row = table.prepare(&record(EntityStatus::CreateFailed)).unwrap();
        let key = row.key();
        table.apply(row);

        let row = table
            .prepare(&record(EntityStatus::Synchronized).with_local_key(key))
            .unwrap();
        table.apply(row);

        let failed = table
            .collect(&Scan::by_status(KeyRange::only(EntityStatus::CreateFailed)))
            .unwrap();
        assert!(failed.is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn rejects_synchronizing() {
        let mut table = Table::default();
        let result = table.prepare(&record(EntityStatus::Synchronizing));
        assert!(matches!(result, Err(StorageError::TransientStatus { .. })));
    }
}
