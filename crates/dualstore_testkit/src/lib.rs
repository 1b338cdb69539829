//! # dualstore testkit
//!
//! Test utilities for dualstore.
//!
//! This crate provides:
//! - [`RemoteFixture`], an in-process authoritative remote store that can be
//!   taken offline or told to fail chosen requests
//! - [`FlakyStore`], a local store wrapper that fails on demand
//! - Collection and journal fixtures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dualstore_testkit::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn create_while_offline() {
//!     let remote = todos_remote();
//!     let collection = memory_collection(&remote);
//!     remote.set_online(false);
//!
//!     let outcome = collection.create(attrs(json!({"name": "a"}))).await.unwrap();
//!     assert!(outcome.is_delayed());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod flaky;
pub mod generators;
pub mod remote;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::flaky::*;
    pub use crate::generators::*;
    pub use crate::remote::*;
}

pub use fixtures::*;
pub use flaky::*;
pub use generators::*;
pub use remote::*;
