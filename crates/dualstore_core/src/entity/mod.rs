//! Entity records and their sync status.

mod key;
mod record;
mod status;

pub use key::{LocalKey, RemoteId};
pub use record::{Attributes, EntityRecord, DEFAULT_REMOTE_ID_ATTRIBUTE, STATUS_FIELD};
pub use status::{EntityStatus, FailedStatus, SyncVerb};
