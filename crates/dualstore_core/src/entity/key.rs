//! Local and remote entity identifiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier assigned to a record by the local store.
///
/// Local keys are:
/// - Assigned by the adapter on first `put`
/// - Stable for the record's local lifetime
/// - Never reused, even after the record is removed
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalKey(u64);

impl LocalKey {
    /// Creates a local key from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the key following this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalKey({})", self.0)
    }
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LocalKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identifier assigned by the remote store on a successful create.
///
/// Remote stores hand out either numeric or textual ids; both are kept in
/// their original JSON shape so they round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    /// Numeric id, e.g. an auto-increment primary key.
    Number(u64),
    /// Textual id, e.g. a UUID or slug.
    Text(String),
}

impl RemoteId {
    /// Extracts a remote id from a JSON value.
    ///
    /// `null`, `false`, the empty string and non-integer numbers count as
    /// "no id", the same way a missing field does.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(Self::Number),
            Value::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Converts the id back into its JSON shape.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RemoteId {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RemoteId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RemoteId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_key_ordering_and_next() {
        let a = LocalKey::new(1);
        assert!(a < a.next());
        assert_eq!(a.next().as_u64(), 2);
        assert_eq!(LocalKey::new(u64::MAX).next().as_u64(), u64::MAX);
    }

    #[test]
    fn remote_id_from_json() {
        assert_eq!(RemoteId::from_json(&json!(42)), Some(RemoteId::Number(42)));
        assert_eq!(
            RemoteId::from_json(&json!("abc")),
            Some(RemoteId::Text("abc".into()))
        );
        assert_eq!(RemoteId::from_json(&json!("")), None);
        assert_eq!(RemoteId::from_json(&Value::Null), None);
        assert_eq!(RemoteId::from_json(&json!(false)), None);
        assert_eq!(RemoteId::from_json(&json!(1.5)), None);
    }

    #[test]
    fn remote_id_keeps_json_shape() {
        assert_eq!(RemoteId::Number(7).to_json(), json!(7));
        assert_eq!(RemoteId::from("x-1").to_json(), json!("x-1"));
        assert_eq!(RemoteId::Number(7).to_string(), "7");
    }
}
