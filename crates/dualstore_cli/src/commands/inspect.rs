//! Inspect command implementation.

use dualstore_core::EntityStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Number of stored records, tombstones included.
    pub record_count: usize,
    /// Number of records with a remote id.
    pub with_remote_id: usize,
    /// Record count per status name.
    pub statuses: BTreeMap<String, usize>,
}

impl InspectResult {
    /// Returns the number of records awaiting remote replay.
    pub fn delayed_count(&self) -> usize {
        EntityStatus::ALL
            .iter()
            .filter(|status| status.is_delayed())
            .filter_map(|status| self.statuses.get(status.as_str()))
            .sum()
    }
}

/// Reads the journal and tallies its records.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = super::open_existing(path)?;
    let records = store.records()?;

    let mut statuses: BTreeMap<String, usize> = EntityStatus::ALL
        .iter()
        .filter(|status| status.is_persistable())
        .map(|status| (status.as_str().to_string(), 0))
        .collect();
    for record in &records {
        *statuses.entry(record.status.as_str().to_string()).or_insert(0) += 1;
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        journal_size: store.journal_size(),
        record_count: records.len(),
        with_remote_id: records.iter().filter(|r| r.has_remote_id()).count(),
        statuses,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("dualstore Journal Inspection");
    println!("============================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.journal_size));
    println!();
    println!("Records:");
    println!("  Total:          {}", result.record_count);
    println!("  With remote id: {}", result.with_remote_id);
    println!("  Delayed:        {}", result.delayed_count());
    println!();
    println!("Statuses:");
    for (status, count) in &result.statuses {
        println!("  {status:<14} {count}");
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualstore_core::{EntityRecord, RemoteId};
    use dualstore_storage::{FileStore, LocalStore};
    use tempfile::TempDir;

    #[tokio::test]
    async fn counts_records_per_status() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("todos.journal");
        {
            let store = FileStore::open(&path).unwrap();
            store
                .put(&EntityRecord::default().with_status(EntityStatus::CreateFailed))
                .await
                .unwrap();
            store
                .put(
                    &EntityRecord::default()
                        .with_remote_id(RemoteId::Number(3))
                        .with_status(EntityStatus::DeleteFailed),
                )
                .await
                .unwrap();
            store
                .put(&EntityRecord::default().with_remote_id(RemoteId::Number(4)))
                .await
                .unwrap();
            store.close().unwrap();
        }

        let result = inspect(&path).unwrap();
        assert_eq!(result.record_count, 3);
        assert_eq!(result.with_remote_id, 2);
        assert_eq!(result.delayed_count(), 2);
        assert_eq!(result.statuses["SYNCHRONIZED"], 1);
        assert_eq!(result.statuses["UPDATE_FAILED"], 0);
        assert!(!result.statuses.contains_key("SYNCHRONIZING"));
        assert!(result.journal_size > 0);
    }

    #[test]
    fn missing_journal_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.journal");
        assert!(inspect(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
