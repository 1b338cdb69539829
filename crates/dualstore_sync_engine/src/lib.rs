//! # dualstore sync engine
//!
//! Offline-first synchronization between a local store and a remote store.
//!
//! This crate provides:
//! - The remote transport contract, a scripted mock and a REST transport
//! - [`DualCollection`], which writes locally first and remotely second
//! - The bootstrap protocol ([`DualCollection::first_sync`]) with its
//!   lifecycle events
//! - The reconciliation protocol ([`DualCollection::full_sync`]) that
//!   replays delayed writes
//!
//! ## Architecture
//!
//! Every write goes to the local store with a pessimistic `*_FAILED` status
//! before the remote call is attempted. The status is cleared only when the
//! remote store confirms, so a crash or an unreachable endpoint leaves the
//! record marked for replay rather than falsely synchronized.
//!
//! Reconciliation is invoked on demand (typically on reconnect). It scans
//! the `status` index for delayed records, replays each one with the verb
//! derived from its failure status, and merges the responses back.
//!
//! ## Key Invariants
//!
//! - The remote store is authoritative; merges are last-writer-wins
//! - `Synchronizing` is never persisted
//! - A retained `DeleteFailed` tombstone is hidden from reads until its
//!   remote delete is confirmed
//! - Bootstrap and reconciliation never overlap on one collection
//! - Locks are never held across a remote call
//! - Retries are never automatic; [`SyncError::is_retryable`] only classifies

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bootstrap;
mod collection;
mod config;
mod error;
mod events;
mod http;
mod merge;
mod reconcile;
mod state;
mod transport;

pub use bootstrap::{FirstSync, FirstSyncOptions, MergeMode, SuccessCallback};
pub use collection::{DestroyOutcome, DualCollection, WriteOutcome};
pub use config::{SyncConfig, DEFAULT_DISPATCH_TIMEOUT, DEFAULT_EVENT_CAPACITY};
pub use error::{RemoteError, RemoteResult, SyncError, SyncResult};
pub use events::{SyncEmitter, SyncEvent, SyncEventName};
pub use http::{HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer};
pub use merge::MergeHooks;
pub use reconcile::FullSyncReport;
pub use state::{SyncState, SyncStats};
pub use transport::{MockTransport, RemoteRequest, RemoteTransport};
