//! Compact command implementation.

use std::path::Path;

/// Compaction statistics.
#[derive(Debug)]
pub struct CompactStats {
    /// Records carried into the snapshot.
    pub records: usize,
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction.
    pub bytes_after: u64,
}

impl CompactStats {
    /// Returns the bytes reclaimed.
    pub fn saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Rewrites the journal at `path` as a single snapshot frame.
pub fn compact(path: &Path) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let store = super::open_existing(path)?;
    let bytes_before = store.journal_size();
    let records = store.records()?.len();
    store.compact()?;
    let bytes_after = store.journal_size();
    store.close()?;

    Ok(CompactStats {
        records,
        bytes_before,
        bytes_after,
    })
}

/// Runs the compact command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting journal at {}", path.display());
    let stats = compact(path)?;

    println!();
    println!("  Records:     {}", stats.records);
    println!("  Size before: {} bytes", stats.bytes_before);
    println!("  Size after:  {} bytes", stats.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        stats.saved(),
        if stats.bytes_before > 0 {
            (stats.saved() as f64 / stats.bytes_before as f64) * 100.0
        } else {
            0.0
        }
    );
    Ok(())
}
