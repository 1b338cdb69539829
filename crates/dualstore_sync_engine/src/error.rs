//! Error types for the sync engine.

use crate::state::SyncState;
use dualstore_core::{CoreError, EntityRecord, LocalKey};
use dualstore_storage::StorageError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for remote transport calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure of one remote call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The remote endpoint could not be reached.
    #[error("remote store unreachable: {0}")]
    Unreachable(String),

    /// The remote store answered with a non-success status.
    #[error("remote store rejected request with status {status}")]
    Rejected {
        /// HTTP-like status code.
        status: u16,
        /// Response body, as JSON when it parsed.
        body: Value,
    },

    /// The call did not complete in time.
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The response could not be interpreted.
    #[error("invalid remote response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Creates an unreachable error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Returns true if repeating the call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Unreachable(_) | RemoteError::Timeout(_) => true,
            RemoteError::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            RemoteError::InvalidResponse(_) => false,
        }
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The local store failed.
    #[error("local store error: {0}")]
    Local(#[from] StorageError),

    /// A remote call failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Reconciliation stopped at the first record whose replay failed.
    #[error("reconciliation aborted at record {:?}: {source}", .record.local_key)]
    Reconciliation {
        /// The record whose replay failed, as it was before dispatch.
        record: Box<EntityRecord>,
        /// The remote failure.
        source: RemoteError,
    },

    /// A record's status contradicts its remote id.
    #[error("invariant violation: {0}")]
    Invariant(CoreError),

    /// A sync protocol was started while another one was running.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: SyncState,
        /// Attempted target state.
        to: SyncState,
    },

    /// No in-memory entity has this local key.
    #[error("unknown entity {0}")]
    UnknownEntity(LocalKey),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(String),

    /// An error that was also delivered to event subscribers.
    #[error(transparent)]
    Shared(Arc<SyncError>),
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Codec(message) => SyncError::Codec(message),
            CoreError::InvalidPayload(message) => {
                SyncError::Remote(RemoteError::InvalidResponse(message))
            }
            invariant @ CoreError::InvariantViolation { .. } => SyncError::Invariant(invariant),
        }
    }
}

impl SyncError {
    /// Returns true if re-invoking the failed protocol later may succeed.
    ///
    /// This only classifies; scheduling retries is the caller's job.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            SyncError::Reconciliation { source, .. } => source.is_retryable(),
            SyncError::InvalidStateTransition { .. } => true,
            SyncError::Shared(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// Returns the record a reconciliation stopped at, if any.
    pub fn failed_record(&self) -> Option<&EntityRecord> {
        match self {
            SyncError::Reconciliation { record, .. } => Some(record.as_ref()),
            SyncError::Shared(inner) => inner.failed_record(),
            _ => None,
        }
    }
}
