//! Property-based test generators using proptest.
//!
//! Every record strategy yields records whose status agrees with their
//! remote id, so they can be seeded into a store as-is.

use dualstore_core::{Attributes, EntityRecord, EntityStatus, FailedStatus, RemoteId};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for generating any status, `Synchronizing` included.
pub fn entity_status_strategy() -> impl Strategy<Value = EntityStatus> {
    prop::sample::select(EntityStatus::ALL.to_vec())
}

/// Strategy for generating a failure kind.
pub fn failed_status_strategy() -> impl Strategy<Value = FailedStatus> {
    prop::sample::select(FailedStatus::SCAN_ORDER.to_vec())
}

/// Strategy for generating remote ids of either shape.
pub fn remote_id_strategy() -> impl Strategy<Value = RemoteId> {
    prop_oneof![
        (1u64..1_000_000).prop_map(RemoteId::Number),
        prop::string::string_regex("[a-f0-9]{8}")
            .expect("Invalid regex")
            .prop_map(RemoteId::Text),
    ]
}

/// Strategy for generating small attribute maps of scalar values.
///
/// Never produces the `id` or `status` keys.
pub fn attributes_strategy() -> impl Strategy<Value = Attributes> {
    let scalar = prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[a-z ]{0,12}")
            .expect("Invalid regex")
            .prop_map(Value::from),
    ];
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}")
            .expect("Invalid regex")
            .prop_filter("reserved attribute", |k| k != "id" && k != "status"),
        scalar,
        0..4,
    )
    .prop_map(|map| map.into_iter().collect())
}

/// Strategy for generating an unkeyed record in a persistable status.
pub fn record_strategy() -> impl Strategy<Value = EntityRecord> {
    (
        prop::sample::select(vec![
            EntityStatus::Synchronized,
            EntityStatus::CreateFailed,
            EntityStatus::UpdateFailed,
            EntityStatus::DeleteFailed,
        ]),
        remote_id_strategy(),
        attributes_strategy(),
    )
        .prop_map(|(status, remote_id, attributes)| {
            let record = EntityRecord::new(attributes).with_status(status);
            if status == EntityStatus::CreateFailed {
                record
            } else {
                record.with_remote_id(remote_id)
            }
        })
}

/// Strategy for generating an unkeyed delayed record.
pub fn delayed_record_strategy() -> impl Strategy<Value = EntityRecord> {
    record_strategy().prop_filter("record must be delayed", EntityRecord::is_delayed)
}

/// Strategy for generating a batch of records with distinct remote ids.
pub fn record_batch_strategy(max: usize) -> impl Strategy<Value = Vec<EntityRecord>> {
    prop::collection::vec(record_strategy(), 0..=max).prop_map(|records| {
        let mut seen = std::collections::HashSet::new();
        records
            .into_iter()
            .filter(|record| match &record.remote_id {
                Some(id) => seen.insert(id.clone()),
                None => true,
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn records_satisfy_invariants(record in record_strategy()) {
            prop_assert!(record.check_invariants().is_ok());
            prop_assert!(record.status.is_persistable());
            prop_assert!(record.local_key.is_none());
        }

        #[test]
        fn attributes_avoid_reserved_keys(attributes in attributes_strategy()) {
            prop_assert!(!attributes.contains_key("id"));
            prop_assert!(!attributes.contains_key("status"));
        }

        #[test]
        fn batches_have_distinct_remote_ids(batch in record_batch_strategy(12)) {
            let ids: Vec<_> = batch.iter().filter_map(|r| r.remote_id.clone()).collect();
            let unique: std::collections::HashSet<_> = ids.iter().cloned().collect();
            prop_assert_eq!(ids.len(), unique.len());
        }
    }
}
