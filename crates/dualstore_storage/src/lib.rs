//! # dualstore storage
//!
//! The local store adapter contract and its implementations.
//!
//! The sync engine never talks to a concrete persistence engine. It drives a
//! [`LocalStore`]: an upsert-by-key record store with one secondary index on
//! the record status, range iteration over that index, and atomic batch
//! removal.
//!
//! ## Design Principles
//!
//! - Adapters are keyed by [`LocalKey`](dualstore_core::LocalKey) and assign
//!   keys themselves; keys are never reused
//! - The `status` index is the only secondary index
//! - Every call reports exactly one outcome: a value or a [`StorageError`]
//! - Adapters know nothing about the remote store
//!
//! ## Available Adapters
//!
//! - [`InMemoryStore`] - For testing and ephemeral collections
//! - [`FileStore`] - Durable, journal-backed storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use dualstore_core::{EntityRecord, EntityStatus};
//! use dualstore_storage::{InMemoryStore, KeyRange, LocalStore, Scan};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let store = InMemoryStore::new();
//! let record = EntityRecord::default().with_status(EntityStatus::CreateFailed);
//! let key = store.put(&record).await.unwrap();
//!
//! let delayed = store
//!     .scan(&Scan::by_status(KeyRange::only(EntityStatus::CreateFailed)))
//!     .await
//!     .unwrap();
//! assert_eq!(delayed[0].local_key, Some(key));
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod file;
mod memory;
mod table;

pub use adapter::{KeyRange, LocalStore, Scan};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
