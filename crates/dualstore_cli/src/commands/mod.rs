//! CLI command implementations.

pub mod compact;
pub mod delayed;
pub mod inspect;

use dualstore_storage::FileStore;
use std::path::Path;
use tracing::debug;

/// Opens an existing journal. Unlike [`FileStore::open`], a missing file is
/// an error rather than a new empty journal.
pub fn open_existing(path: &Path) -> Result<FileStore, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("No journal found at {}", path.display()).into());
    }
    debug!(path = %path.display(), "opening journal");
    Ok(FileStore::open(path)?)
}
