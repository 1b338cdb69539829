//! Journal-backed local store for durable storage.

use crate::adapter::{LocalStore, Scan};
use crate::error::{StorageError, StorageResult};
use crate::table::Table;
use async_trait::async_trait;
use dualstore_core::{EntityRecord, LocalKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, error, info, warn};

/// Size of the little-endian length prefix in front of every frame.
const FRAME_HEADER_SIZE: usize = 4;

/// One durable mutation.
#[derive(Debug, Serialize, Deserialize)]
enum JournalEntry {
    Put(EntityRecord),
    Batch(Vec<EntityRecord>),
    Remove(Vec<LocalKey>),
    Snapshot {
        next_key: LocalKey,
        records: Vec<EntityRecord>,
    },
}

#[derive(Debug)]
struct FileState {
    file: File,
    table: Table,
    /// Length of the acknowledged journal prefix.
    size: u64,
    closed: bool,
    /// Set when the journal handle no longer refers to the journal file.
    poisoned: bool,
}

/// A durable local store.
///
/// Every mutation is appended to a journal file as one length-prefixed CBOR
/// frame and synced before it becomes visible. Opening the store replays
/// the journal into memory.
///
/// # Durability
///
/// - A mutation that returned `Ok` survives process termination
/// - A torn trailing frame (crash mid-append) is discarded on open
/// - A complete frame that fails to decode is reported as corruption
/// - [`FileStore::compact`] rewrites the journal atomically via rename
/// - A failed append is rolled back to the last acknowledged frame, and any
///   stray bytes past it are truncated before the next append
///
/// # Blocking
///
/// Mutations through [`LocalStore`] run their file I/O on the Tokio blocking
/// pool and need a Tokio runtime. The inherent `records`, `compact` and
/// `close` methods block the calling thread.
///
/// # Example
///
/// ```no_run
/// use dualstore_core::EntityRecord;
/// use dualstore_storage::{FileStore, LocalStore};
/// use std::path::Path;
///
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let store = FileStore::open(Path::new("todos.journal")).unwrap();
/// store.put(&EntityRecord::default()).await.unwrap();
/// # });
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Arc<Mutex<FileState>>,
}

impl FileStore {
    /// Opens or creates a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, or if a complete
    /// journal frame cannot be decoded.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut table = Table::default();
        let valid = replay(&bytes, &mut table)?;
        if valid < bytes.len() {
            warn!(
                path = %path.display(),
                discarded = bytes.len() - valid,
                "discarding torn journal frame"
            );
            file.set_len(valid as u64)?;
            file.sync_all()?;
        }

        info!(path = %path.display(), records = table.len(), "opened file store");

        Ok(Self {
            path: path.to_path_buf(),
            state: Arc::new(Mutex::new(FileState {
                file,
                table,
                size: valid as u64,
                closed: false,
                poisoned: false,
            })),
        })
    }

    /// Opens or creates a store, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the store cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the journal size in bytes.
    pub fn journal_size(&self) -> u64 {
        self.state.lock().size
    }

    /// Returns a copy of every stored record.
    pub fn records(&self) -> StorageResult<Vec<EntityRecord>> {
        let state = self.state.lock();
        ensure_open(&state)?;
        state.table.records()
    }

    /// Rewrites the journal as a single snapshot frame.
    ///
    /// The snapshot is written to a sibling file and renamed over the
    /// journal, so a crash leaves either the old or the new journal intact.
    pub fn compact(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        ensure_open(&state)?;

        let before = state.size;
        let entry = JournalEntry::Snapshot {
            next_key: state.table.next_key(),
            records: state.table.records()?,
        };
        let frame = encode_frame(&entry)?;

        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&frame)?;
            tmp.sync_all()?;
        }
        if let Err(err) = fs::rename(&tmp_path, &self.path) {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                warn!(
                    path = %tmp_path.display(),
                    error = %cleanup,
                    "could not remove compaction file"
                );
            }
            return Err(err.into());
        }

        // The old handle now points at the unlinked journal.
        match OpenOptions::new().read(true).append(true).open(&self.path) {
            Ok(file) => state.file = file,
            Err(err) => {
                error!(
                    path = %self.path.display(),
                    error = %err,
                    "could not reopen compacted journal"
                );
                state.poisoned = true;
                return Err(err.into());
            }
        }
        state.size = frame.len() as u64;
        info!(path = %self.path.display(), before, after = state.size, "compacted journal");
        Ok(())
    }

    /// Runs a journal mutation on the blocking pool.
    async fn mutate<R, F>(&self, op: F) -> StorageResult<R>
    where
        F: FnOnce(&mut FileState) -> StorageResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let state = Arc::clone(&self.state);
        task::spawn_blocking(move || {
            let mut state = state.lock();
            ensure_open(&state)?;
            op(&mut state)
        })
        .await
        .map_err(|e| StorageError::Io(io::Error::other(e)))?
    }

    /// Syncs the journal and closes the store.
    ///
    /// Every later operation fails with [`StorageError::Closed`].
    pub fn close(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.file.sync_all()?;
        state.closed = true;
        Ok(())
    }
}

fn ensure_open(state: &FileState) -> StorageResult<()> {
    if state.closed {
        Err(StorageError::Closed)
    } else if state.poisoned {
        Err(StorageError::Poisoned)
    } else {
        Ok(())
    }
}

fn encode_frame(entry: &JournalEntry) -> StorageResult<Vec<u8>> {
    let mut body = Vec::new();
    ciborium::into_writer(entry, &mut body)
        .map_err(|e| StorageError::corrupted(format!("failed to encode journal frame: {e}")))?;
    let len = u32::try_from(body.len())
        .map_err(|_| StorageError::rejected("journal frame exceeds 4 GiB"))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Replays every complete frame and returns the length of the valid prefix.
fn replay(bytes: &[u8], table: &mut Table) -> StorageResult<usize> {
    let mut offset = 0;
    while bytes.len() - offset >= FRAME_HEADER_SIZE {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header.copy_from_slice(&bytes[offset..offset + FRAME_HEADER_SIZE]);
        let len = u32::from_le_bytes(header) as usize;

        let start = offset + FRAME_HEADER_SIZE;
        let Some(end) = start.checked_add(len).filter(|end| *end <= bytes.len()) else {
            break;
        };

        let entry: JournalEntry = ciborium::from_reader(&bytes[start..end]).map_err(|e| {
            StorageError::corrupted(format!("undecodable journal frame at offset {offset}: {e}"))
        })?;
        apply_entry(table, entry)?;
        offset = end;
    }
    Ok(offset)
}

fn apply_entry(table: &mut Table, entry: JournalEntry) -> StorageResult<()> {
    match entry {
        JournalEntry::Put(record) => {
            let row = table.prepare(&record)?;
            table.apply(row);
        }
        JournalEntry::Batch(records) => {
            for row in table.prepare_all(&records)? {
                table.apply(row);
            }
        }
        JournalEntry::Remove(keys) => {
            table.remove(&keys);
        }
        JournalEntry::Snapshot { next_key, records } => {
            table.clear();
            table.set_next_key(next_key);
            for row in table.prepare_all(&records)? {
                table.apply(row);
            }
        }
    }
    Ok(())
}

impl FileState {
    fn append(&mut self, entry: &JournalEntry) -> StorageResult<()> {
        let frame = encode_frame(entry)?;
        self.discard_unacknowledged()?;
        if let Err(err) = self.write_frame(&frame) {
            if let Err(rollback) = self.discard_unacknowledged() {
                warn!(error = %rollback, "could not roll back failed journal append");
            }
            return Err(err.into());
        }
        self.size += frame.len() as u64;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.file.write_all(frame)?;
        self.file.sync_data()
    }

    /// Truncates bytes past the acknowledged prefix left by a failed write.
    fn discard_unacknowledged(&mut self) -> StorageResult<()> {
        let len = self.file.metadata()?.len();
        if len < self.size {
            return Err(StorageError::corrupted(format!(
                "journal shrank to {len} bytes, expected at least {}",
                self.size
            )));
        }
        if len > self.size {
            warn!(
                acknowledged = self.size,
                found = len,
                "discarding unacknowledged journal bytes"
            );
            self.file.set_len(self.size)?;
            self.file.sync_all()?;
        }
        Ok(())
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn put(&self, record: &EntityRecord) -> StorageResult<LocalKey> {
        let record = record.clone();
        self.mutate(move |state| {
            let row = state.table.prepare(&record)?;
            let key = row.key();
            state.append(&JournalEntry::Put(row.record.clone()))?;
            state.table.apply(row);
            debug!(local_key = %key, status = %record.status, "journaled put");
            Ok(key)
        })
        .await
    }

    async fn get(&self, key: LocalKey) -> StorageResult<Option<EntityRecord>> {
        let state = self.state.lock();
        ensure_open(&state)?;
        state.table.get(key)
    }

    async fn iterate(
        &self,
        scan: &Scan,
        visit: &mut (dyn FnMut(EntityRecord) + Send),
    ) -> StorageResult<()> {
        let records = {
            let state = self.state.lock();
            ensure_open(&state)?;
            state.table.collect(scan)?
        };
        for record in records {
            visit(record);
        }
        Ok(())
    }

    async fn remove_batch(&self, keys: &[LocalKey]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys = keys.to_vec();
        self.mutate(move |state| {
            state.append(&JournalEntry::Remove(keys.clone()))?;
            let removed = state.table.remove(&keys);
            debug!(requested = keys.len(), removed, "journaled removal");
            Ok(())
        })
        .await
    }

    async fn save_all(&self, records: &[EntityRecord]) -> StorageResult<Vec<LocalKey>> {
        let records = records.to_vec();
        self.mutate(move |state| {
            let rows = state.table.prepare_all(&records)?;
            let keys: Vec<LocalKey> = rows.iter().map(|row| row.key()).collect();
            let batch = rows.iter().map(|row| row.record.clone()).collect();
            state.append(&JournalEntry::Batch(batch))?;
            for row in rows {
                state.table.apply(row);
            }
            debug!(count = keys.len(), "journaled batch");
            Ok(keys)
        })
        .await
    }

    async fn count(&self) -> StorageResult<usize> {
        let state = self.state.lock();
        ensure_open(&state)?;
        Ok(state.table.len())
    }
}
