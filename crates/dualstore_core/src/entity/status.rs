//! Sync status of a single entity and the verbs used to replay it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The sync status of one entity.
///
/// Variants are declared in index order: the local store's status index
/// sorts records by this ordering, so range scans over it are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    /// Local and remote copies agree.
    Synchronized,
    /// A remote call for this entity is outstanding. Memory only.
    Synchronizing,
    /// The entity was never accepted by the remote store.
    CreateFailed,
    /// The last update did not reach the remote store.
    UpdateFailed,
    /// The entity is deleted locally but the remote delete is unconfirmed.
    DeleteFailed,
}

impl EntityStatus {
    /// All statuses, in index order.
    pub const ALL: [EntityStatus; 5] = [
        EntityStatus::Synchronized,
        EntityStatus::Synchronizing,
        EntityStatus::CreateFailed,
        EntityStatus::UpdateFailed,
        EntityStatus::DeleteFailed,
    ];

    /// Returns the failure kind if this status marks a delayed entity.
    pub fn as_failed(&self) -> Option<FailedStatus> {
        match self {
            EntityStatus::CreateFailed => Some(FailedStatus::CreateFailed),
            EntityStatus::UpdateFailed => Some(FailedStatus::UpdateFailed),
            EntityStatus::DeleteFailed => Some(FailedStatus::DeleteFailed),
            EntityStatus::Synchronized | EntityStatus::Synchronizing => None,
        }
    }

    /// Returns true if the last remote write failed.
    pub fn is_delayed(&self) -> bool {
        self.as_failed().is_some()
    }

    /// Returns true if this status may be written to the local store.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, EntityStatus::Synchronizing)
    }

    /// Returns the verb that replays this status, if any.
    pub fn sync_verb(&self) -> Option<SyncVerb> {
        self.as_failed().map(|failed| failed.verb())
    }

    /// Returns the canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Synchronized => "SYNCHRONIZED",
            EntityStatus::Synchronizing => "SYNCHRONIZING",
            EntityStatus::CreateFailed => "CREATE_FAILED",
            EntityStatus::UpdateFailed => "UPDATE_FAILED",
            EntityStatus::DeleteFailed => "DELETE_FAILED",
        }
    }
}

impl Default for EntityStatus {
    fn default() -> Self {
        EntityStatus::Synchronized
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three statuses that mark a delayed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailedStatus {
    /// See [`EntityStatus::CreateFailed`].
    CreateFailed,
    /// See [`EntityStatus::UpdateFailed`].
    UpdateFailed,
    /// See [`EntityStatus::DeleteFailed`].
    DeleteFailed,
}

impl FailedStatus {
    /// All failure kinds, in the order delayed data is scanned.
    pub const SCAN_ORDER: [FailedStatus; 3] = [
        FailedStatus::DeleteFailed,
        FailedStatus::CreateFailed,
        FailedStatus::UpdateFailed,
    ];

    /// Derives the verb that replays this failure.
    pub fn verb(&self) -> SyncVerb {
        match self {
            FailedStatus::CreateFailed => SyncVerb::Create,
            FailedStatus::UpdateFailed => SyncVerb::Update,
            FailedStatus::DeleteFailed => SyncVerb::Delete,
        }
    }

    /// Returns true if a record in this state must already exist remotely.
    pub fn requires_remote_id(&self) -> bool {
        !matches!(self, FailedStatus::CreateFailed)
    }
}

impl From<FailedStatus> for EntityStatus {
    fn from(failed: FailedStatus) -> Self {
        match failed {
            FailedStatus::CreateFailed => EntityStatus::CreateFailed,
            FailedStatus::UpdateFailed => EntityStatus::UpdateFailed,
            FailedStatus::DeleteFailed => EntityStatus::DeleteFailed,
        }
    }
}

/// A remote operation verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncVerb {
    /// Create a new remote entity.
    Create,
    /// Read a remote collection or entity.
    Read,
    /// Replace an existing remote entity.
    Update,
    /// Delete an existing remote entity.
    Delete,
}

impl SyncVerb {
    /// Returns the HTTP method conventionally used for this verb.
    pub fn http_method(&self) -> &'static str {
        match self {
            SyncVerb::Create => "POST",
            SyncVerb::Read => "GET",
            SyncVerb::Update => "PUT",
            SyncVerb::Delete => "DELETE",
        }
    }

    /// Returns true if requests with this verb carry a body.
    pub fn has_body(&self) -> bool {
        matches!(self, SyncVerb::Create | SyncVerb::Update)
    }

    /// Returns the verb name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncVerb::Create => "create",
            SyncVerb::Read => "read",
            SyncVerb::Update => "update",
            SyncVerb::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn verb_derivation() {
        assert_eq!(EntityStatus::CreateFailed.sync_verb(), Some(SyncVerb::Create));
        assert_eq!(EntityStatus::UpdateFailed.sync_verb(), Some(SyncVerb::Update));
        assert_eq!(EntityStatus::DeleteFailed.sync_verb(), Some(SyncVerb::Delete));
        assert_eq!(EntityStatus::Synchronized.sync_verb(), None);
        assert_eq!(EntityStatus::Synchronizing.sync_verb(), None);
    }

    #[test]
    fn delayed_states() {
        assert!(EntityStatus::CreateFailed.is_delayed());
        assert!(EntityStatus::UpdateFailed.is_delayed());
        assert!(EntityStatus::DeleteFailed.is_delayed());
        assert!(!EntityStatus::Synchronized.is_delayed());
        assert!(!EntityStatus::Synchronizing.is_delayed());
    }

    #[test]
    fn synchronizing_is_not_persistable() {
        assert!(!EntityStatus::Synchronizing.is_persistable());
        assert!(EntityStatus::DeleteFailed.is_persistable());
    }

    #[test]
    fn status_serializes_as_screaming_snake() {
        let json = serde_json::to_string(&EntityStatus::UpdateFailed).unwrap();
        assert_eq!(json, "\"UPDATE_FAILED\"");
        let back: EntityStatus = serde_json::from_str("\"DELETE_FAILED\"").unwrap();
        assert_eq!(back, EntityStatus::DeleteFailed);
    }

    #[test]
    fn http_methods() {
        assert_eq!(SyncVerb::Create.http_method(), "POST");
        assert_eq!(SyncVerb::Read.http_method(), "GET");
        assert_eq!(SyncVerb::Update.http_method(), "PUT");
        assert_eq!(SyncVerb::Delete.http_method(), "DELETE");
        assert!(!SyncVerb::Delete.has_body());
    }

    fn any_status() -> impl Strategy<Value = EntityStatus> {
        prop::sample::select(EntityStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn only_failed_states_map_to_verbs(status in any_status()) {
            prop_assert_eq!(status.sync_verb().is_some(), status.is_delayed());
            if let Some(failed) = status.as_failed() {
                prop_assert_eq!(EntityStatus::from(failed), status);
                prop_assert_ne!(failed.verb(), SyncVerb::Read);
            }
        }
    }
}
