//! The entity record shared by the local and remote stores.

use super::key::{LocalKey, RemoteId};
use super::status::{EntityStatus, FailedStatus, SyncVerb};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered mapping from field name to value: the entity's domain payload.
pub type Attributes = Map<String, Value>;

/// Default payload field holding the remote id.
pub const DEFAULT_REMOTE_ID_ATTRIBUTE: &str = "id";

/// Local-only bookkeeping field stripped from every wire payload.
pub const STATUS_FIELD: &str = "status";

/// The unit of synchronization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Key assigned by the local store. `None` until first persisted.
    pub local_key: Option<LocalKey>,
    /// Id assigned by the remote store. `None` until the first successful create.
    pub remote_id: Option<RemoteId>,
    /// Domain payload.
    pub attributes: Attributes,
    /// Sync status.
    pub status: EntityStatus,
}

impl EntityRecord {
    /// Creates a record that exists nowhere yet.
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    /// Sets the local key.
    pub fn with_local_key(mut self, key: LocalKey) -> Self {
        self.local_key = Some(key);
        self
    }

    /// Sets the remote id.
    pub fn with_remote_id(mut self, id: RemoteId) -> Self {
        self.remote_id = Some(id);
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns true once the remote store has accepted the entity.
    pub fn has_remote_id(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Returns true while a remote call for the entity is outstanding.
    pub fn is_in_synchronizing(&self) -> bool {
        self.status == EntityStatus::Synchronizing
    }

    /// Returns true if the last remote write failed.
    pub fn is_delayed(&self) -> bool {
        self.status.is_delayed()
    }

    /// Returns the failure kind of a delayed record.
    pub fn failed_status(&self) -> Option<FailedStatus> {
        self.status.as_failed()
    }

    /// Returns the verb that replays this record, if it is delayed.
    pub fn retry_verb(&self) -> Option<SyncVerb> {
        self.status.sync_verb()
    }

    /// Resolves the resource URL for `verb`.
    ///
    /// Updates and deletes of a remotely known entity address
    /// `base_route/remote_id/`; everything else addresses the collection.
    pub fn url_for_sync(&self, base_route: &str, verb: SyncVerb) -> String {
        match (&self.remote_id, verb) {
            (Some(id), SyncVerb::Update | SyncVerb::Delete) => {
                format!("{}/{}/", base_route.trim_end_matches('/'), id)
            }
            _ => base_route.to_string(),
        }
    }

    /// Checks that the status agrees with the presence of a remote id.
    pub fn check_invariants(&self) -> CoreResult<()> {
        let Some(failed) = self.failed_status() else {
            return Ok(());
        };
        match (failed.requires_remote_id(), self.has_remote_id()) {
            (true, false) => Err(CoreError::invariant(
                self.local_key,
                self.status,
                "record was never created remotely but is marked for remote replay",
            )),
            (false, true) => Err(CoreError::invariant(
                self.local_key,
                self.status,
                "record already has a remote id but is marked create-failed",
            )),
            _ => Ok(()),
        }
    }

    /// Builds the payload sent to the remote store.
    ///
    /// The payload is the attributes plus the remote id under
    /// `remote_id_attribute`. Status and local key stay local.
    pub fn to_wire_payload(&self, remote_id_attribute: &str) -> Value {
        let mut map = self.attributes.clone();
        map.shift_remove(STATUS_FIELD);
        match &self.remote_id {
            Some(id) => {
                map.insert(remote_id_attribute.to_string(), id.to_json());
            }
            None => {
                map.shift_remove(remote_id_attribute);
            }
        }
        Value::Object(map)
    }

    /// Splits a remote payload into a fresh record.
    pub fn from_wire_payload(payload: Value, remote_id_attribute: &str) -> CoreResult<Self> {
        let mut record = Self::default();
        record.apply_wire_payload(payload, remote_id_attribute)?;
        Ok(record)
    }

    /// Replaces attributes and remote id with those of a remote payload.
    ///
    /// A payload without an id keeps the current remote id, since update
    /// responses commonly omit it. A `null` payload leaves the record as is.
    pub fn apply_wire_payload(
        &mut self,
        payload: Value,
        remote_id_attribute: &str,
    ) -> CoreResult<()> {
        let mut map = match payload {
            Value::Object(map) => map,
            Value::Null => return Ok(()),
            other => {
                return Err(CoreError::invalid_payload(format!(
                    "expected an object, got {}",
                    json_kind(&other)
                )))
            }
        };
        map.shift_remove(STATUS_FIELD);
        if let Some(id) = map
            .shift_remove(remote_id_attribute)
            .as_ref()
            .and_then(RemoteId::from_json)
        {
            self.remote_id = Some(id);
        }
        self.attributes = map;
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
