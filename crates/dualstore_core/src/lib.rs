//! # dualstore core
//!
//! Entity records and the per-entity sync status model.
//!
//! An entity lives in two places at once: a local durable store and a remote
//! authoritative store. This crate defines the record both sides agree on and
//! the small state machine deciding whether a record is synchronized, in
//! flight, or delayed (its last remote write failed and must be replayed).
//!
//! This crate performs no I/O. Local adapters live in `dualstore_storage`,
//! the sync protocols in `dualstore_sync_engine`.
//!
//! ## Key Invariants
//!
//! - `CreateFailed` records carry no remote id
//! - `UpdateFailed` and `DeleteFailed` records always carry a remote id
//! - `Synchronizing` exists only in memory and is never persisted
//! - The `status` field never crosses the wire
//!
//! ## Example
//!
//! ```
//! use dualstore_core::{EntityRecord, EntityStatus, RemoteId, SyncVerb};
//!
//! let record = EntityRecord::default()
//!     .with_remote_id(RemoteId::Number(7))
//!     .with_status(EntityStatus::UpdateFailed);
//!
//! assert!(record.is_delayed());
//! assert_eq!(record.retry_verb(), Some(SyncVerb::Update));
//! assert_eq!(record.url_for_sync("/api/todos", SyncVerb::Update), "/api/todos/7/");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod entity;
mod error;

pub use codec::{decode_record, encode_record};
pub use entity::{
    Attributes, EntityRecord, EntityStatus, FailedStatus, LocalKey, RemoteId, SyncVerb,
    DEFAULT_REMOTE_ID_ATTRIBUTE, STATUS_FIELD,
};
pub use error::{CoreError, CoreResult};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
