//! Delayed command implementation.

use dualstore_core::{EntityRecord, FailedStatus};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// One record awaiting remote replay.
#[derive(Debug, Serialize)]
pub struct DelayedEntry {
    /// Local key.
    pub local_key: Option<u64>,
    /// Remote id, if the remote store ever accepted the record.
    pub remote_id: Option<Value>,
    /// Stored status.
    pub status: String,
    /// Verb a reconciliation would replay it with.
    pub retry_verb: String,
    /// Why the status contradicts the remote id, if it does.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invariant_violation: Option<String>,
}

impl From<&EntityRecord> for DelayedEntry {
    fn from(record: &EntityRecord) -> Self {
        Self {
            local_key: record.local_key.map(|key| key.as_u64()),
            remote_id: record.remote_id.as_ref().map(|id| id.to_json()),
            status: record.status.as_str().to_string(),
            retry_verb: record
                .retry_verb()
                .map_or_else(String::new, |verb| verb.as_str().to_string()),
            invariant_violation: record.check_invariants().err().map(|e| e.to_string()),
        }
    }
}

/// Lists delayed records in replay scan order.
pub fn collect(path: &Path) -> Result<Vec<DelayedEntry>, Box<dyn std::error::Error>> {
    let store = super::open_existing(path)?;
    let records = store.records()?;

    let mut entries = Vec::new();
    for failed in FailedStatus::SCAN_ORDER {
        entries.extend(
            records
                .iter()
                .filter(|record| record.failed_status() == Some(failed))
                .map(DelayedEntry::from),
        );
    }
    Ok(entries)
}

/// Runs the delayed command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entries = collect(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => print_text_output(&entries),
    }
    Ok(())
}

fn print_text_output(entries: &[DelayedEntry]) {
    if entries.is_empty() {
        println!("No delayed records");
        return;
    }

    println!("{:>8}  {:<14} {:<8} REMOTE ID", "KEY", "STATUS", "VERB");
    for entry in entries {
        let key = entry
            .local_key
            .map_or_else(|| "-".to_string(), |key| key.to_string());
        let remote_id = entry
            .remote_id
            .as_ref()
            .map_or_else(|| "-".to_string(), Value::to_string);
        println!(
            "{key:>8}  {:<14} {:<8} {remote_id}",
            entry.status, entry.retry_verb
        );
        if let Some(violation) = &entry.invariant_violation {
            println!("          ! {violation}");
        }
    }
    println!();
    println!("{} delayed record(s)", entries.len());
}
