//! Error types for dualstore core.

use crate::entity::{EntityStatus, LocalKey};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in dualstore core operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    /// A record's status contradicts its remote id.
    ///
    /// This is a programmer error and is never retried.
    #[error("invariant violation on record {local_key:?} with status {status}: {message}")]
    InvariantViolation {
        /// Local key of the offending record, if it has one.
        local_key: Option<LocalKey>,
        /// Status the record carried.
        status: EntityStatus,
        /// Description of the violated invariant.
        message: String,
    },

    /// CBOR encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A payload did not have the expected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl CoreError {
    /// Creates an invariant violation error.
    pub fn invariant(
        local_key: Option<LocalKey>,
        status: EntityStatus,
        message: impl Into<String>,
    ) -> Self {
        Self::InvariantViolation {
            local_key,
            status,
            message: message.into(),
        }
    }

    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }
}
