//! Error types for local store operations.

use dualstore_core::{CoreError, LocalKey};
use std::io;
use thiserror::Error;

/// Result type for local store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during local store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Core(#[from] CoreError),

    /// The journal is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Attempted to persist a record that is mid-flight.
    #[error("record {local_key:?} is synchronizing and cannot be persisted")]
    TransientStatus {
        /// Key of the rejected record, if it has one.
        local_key: Option<LocalKey>,
    },

    /// The store is closed.
    #[error("store is closed")]
    Closed,

    /// The journal handle was lost; the store must be reopened.
    #[error("journal handle lost, reopen the store")]
    Poisoned,

    /// The adapter refused the operation.
    #[error("store rejected operation: {0}")]
    Rejected(String),
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}
