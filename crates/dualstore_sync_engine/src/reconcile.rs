//! Full-sync protocol: replays every delayed write.

use crate::bootstrap::MergeMode;
use crate::collection::DualCollection;
use crate::error::{SyncError, SyncResult};
use crate::state::{ActiveSync, SyncState};
use crate::transport::{RemoteRequest, RemoteTransport};
use dualstore_core::{CoreError, EntityRecord, EntityStatus, FailedStatus, SyncVerb};
use dualstore_storage::LocalStore;
use futures::stream::{FuturesUnordered, StreamExt};
use std::slice;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of a successful reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullSyncReport {
    /// Delayed creates the remote store accepted.
    pub created: usize,
    /// Delayed updates the remote store accepted.
    pub updated: usize,
    /// Delayed deletes confirmed and garbage-collected.
    pub deleted: usize,
    /// Records in the final remote snapshot.
    pub fetched: usize,
}

impl FullSyncReport {
    /// Returns the number of replayed writes.
    pub fn replayed(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    fn count(&mut self, verb: SyncVerb) {
        match verb {
            SyncVerb::Create => self.created += 1,
            SyncVerb::Update => self.updated += 1,
            SyncVerb::Delete => self.deleted += 1,
            SyncVerb::Read => {}
        }
    }
}

impl<S: LocalStore, T: RemoteTransport> DualCollection<S, T> {
    /// Replays every delayed write against the remote store.
    ///
    /// Delayed records are replayed concurrently on the calling task. A
    /// replay completes only once its local settlement (garbage removal or
    /// merged put) has completed. The first failure aborts the run: the
    /// other in-flight replays are drained, nothing is rolled back, and the
    /// error names the record that failed. On success the collection
    /// re-reads the remote snapshot to pick up entities created elsewhere.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidStateTransition`] if a bootstrap or another
    ///   reconciliation is running
    /// - [`SyncError::Invariant`] if a delayed record's status contradicts
    ///   its remote id; nothing is dispatched
    /// - [`SyncError::Reconciliation`] for the first failed remote replay
    /// - [`SyncError::Local`] if the local store fails
    pub async fn full_sync(&self) -> SyncResult<FullSyncReport> {
        let active = ActiveSync::begin(&self.state, SyncState::Reconciling)?;
        let result = self.reconcile().await;

        match &result {
            Ok(report) => {
                {
                    let mut stats = self.stats.write();
                    stats.reconciliations += 1;
                    stats.replayed_creates += report.created as u64;
                    stats.replayed_updates += report.updated as u64;
                    stats.replayed_deletes += report.deleted as u64;
                    stats.last_sync_time = Some(Instant::now());
                    stats.last_error = None;
                }
                active.finish(true);
                info!(
                    created = report.created,
                    updated = report.updated,
                    deleted = report.deleted,
                    fetched = report.fetched,
                    "full sync complete"
                );
            }
            Err(err) => {
                error!(error = %err, "full sync aborted");
                self.record_failure(err);
                active.finish(false);
            }
        }
        result
    }

    async fn reconcile(&self) -> SyncResult<FullSyncReport> {
        let delayed = self.get_delayed_data().await?;
        info!(delayed = delayed.len(), url = %self.config.url, "starting full sync");

        for record in &delayed {
            record.check_invariants()?;
        }

        let mut in_flight: FuturesUnordered<_> =
            delayed.into_iter().map(|record| self.replay(record)).collect();
        let mut report = FullSyncReport::default();
        let mut first_error = None;
        while let Some(outcome) = in_flight.next().await {
            match outcome {
                Ok(verb) => report.count(verb),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        report.fetched = self.refresh_from_remote().await?;
        Ok(report)
    }

    /// Replays one delayed record and settles it locally.
    async fn replay(&self, record: EntityRecord) -> SyncResult<SyncVerb> {
        let failed = record.failed_status().ok_or_else(|| {
            SyncError::Invariant(CoreError::invariant(
                record.local_key,
                record.status,
                "record is not delayed",
            ))
        })?;
        let verb = failed.verb();
        let request = RemoteRequest::for_record(
            &record,
            verb,
            &self.config.url,
            &self.config.remote_id_attribute,
        );
        debug!(
            local_key = ?record.local_key,
            verb = %verb,
            url = %request.url,
            "replaying delayed write"
        );

        if let Some(key) = record.local_key {
            self.entities
                .write()
                .set_status(key, EntityStatus::Synchronizing);
        }
        let response = match self.dispatch(request).await {
            Ok(response) => response,
            Err(source) => {
                if let Some(key) = record.local_key {
                    self.entities.write().set_status(key, record.status);
                }
                return Err(SyncError::Reconciliation {
                    record: Box::new(record),
                    source,
                });
            }
        };

        let (key, status) = (record.local_key, record.status);
        let settled = match failed {
            FailedStatus::DeleteFailed => self
                .remove_garbage(slice::from_ref(&record))
                .await
                .map(drop),
            FailedStatus::CreateFailed | FailedStatus::UpdateFailed => {
                self.settle_write(record, response).await.map(drop)
            }
        };
        if let Err(err) = settled {
            warn!(local_key = ?key, error = %err, "remote write replayed but not settled locally");
            if let Some(key) = key {
                self.entities.write().set_status(key, status);
            }
            return Err(err);
        }
        Ok(verb)
    }

    /// Merges the remote snapshot like a `Set` bootstrap, without events.
    async fn refresh_from_remote(&self) -> SyncResult<usize> {
        let response = self
            .dispatch(RemoteRequest::read(self.config.url.clone()))
            .await?;
        let snapshot = self.parse_collection(response)?;
        let fetched = snapshot.len();

        self.fetch().await?;
        self.entities
            .write()
            .merge_snapshot(snapshot, MergeMode::Set);
        self.save().await?;
        self.fetch().await?;
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::error::RemoteError;
    use crate::transport::MockTransport;
    use dualstore_core::{LocalKey, RemoteId};
    use dualstore_storage::InMemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn collection(seed: &[EntityRecord]) -> DualCollection<InMemoryStore, MockTransport> {
        DualCollection::new(
            SyncConfig::new("/todos"),
            Arc::new(InMemoryStore::with_records(seed).unwrap()),
            Arc::new(MockTransport::new()),
        )
    }

    #[tokio::test]
    async fn empty_delayed_set_still_resolves() {
        let collection = collection(&[]);
        collection.transport().respond(SyncVerb::Read, json!([]));

        let report = collection.full_sync().await.unwrap();
        assert_eq!(report, FullSyncReport::default());
        assert_eq!(collection.transport().requests().len(), 1);
        assert_eq!(collection.state(), SyncState::Synced);
    }

    #[tokio::test]
    async fn replays_each_failure_kind() {
        let mut created = EntityRecord::default().with_status(EntityStatus::CreateFailed);
        created.attributes.insert("name".into(), json!("a"));
        let seed = vec![
            created,
            EntityRecord::default()
                .with_remote_id(RemoteId::Number(7))
                .with_status(EntityStatus::UpdateFailed),
            EntityRecord::default()
                .with_remote_id(RemoteId::Number(8))
                .with_status(EntityStatus::DeleteFailed),
        ];
        let collection = collection(&seed);
        let transport = collection.transport();
        transport.respond(SyncVerb::Create, json!({"id": 42, "name": "a"}));
        transport.respond(SyncVerb::Update, json!({"id": 7}));
        transport.respond(SyncVerb::Delete, json!(null));
        transport.respond(SyncVerb::Read, json!([{"id": 42, "name": "a"}, {"id": 7}]));

        let report = collection.full_sync().await.unwrap();
        assert_eq!(
            report,
            FullSyncReport {
                created: 1,
                updated: 1,
                deleted: 1,
                fetched: 2
            }
        );
        assert!(collection.get_delayed_data().await.unwrap().is_empty());
        assert_eq!(collection.store().count().await.unwrap(), 2);

        let created = collection.store().get(LocalKey::new(1)).await.unwrap().unwrap();
        assert_eq!(created.remote_id, Some(RemoteId::Number(42)));
        assert_eq!(created.status, EntityStatus::Synchronized);

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert!(urls.contains(&"/todos/7/".to_string()));
        assert!(urls.contains(&"/todos/8/".to_string()));
        assert_eq!(collection.stats().replayed_deletes, 1);
    }

    #[tokio::test]
    async fn invariant_violation_dispatches_nothing() {
        let seed = vec![EntityRecord::default().with_status(EntityStatus::UpdateFailed)];
        let collection = collection(&seed);

        let result = collection.full_sync().await;
        assert!(matches!(result, Err(SyncError::Invariant(_))));
        assert!(collection.transport().requests().is_empty());
        assert_eq!(collection.state(), SyncState::Error);
    }

    #[tokio::test]
    async fn failure_skips_final_fetch() {
        let seed = vec![EntityRecord::default().with_status(EntityStatus::CreateFailed)];
        let collection = collection(&seed);
        collection
            .transport()
            .fail(SyncVerb::Create, RemoteError::unreachable("offline"));

        let err = collection.full_sync().await.unwrap_err();
        assert_eq!(
            err.failed_record().and_then(|r| r.local_key),
            Some(LocalKey::new(1))
        );
        assert!(collection
            .transport()
            .requests_for(SyncVerb::Read)
            .is_empty());
        assert_eq!(collection.get_delayed_data().await.unwrap().len(), 1);
        assert!(collection.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn replay_timeout_fails_reconciliation() {
        let seed = vec![EntityRecord::default().with_status(EntityStatus::CreateFailed)];
        let collection = DualCollection::new(
            SyncConfig::new("/todos").with_dispatch_timeout(std::time::Duration::from_millis(20)),
            Arc::new(InMemoryStore::with_records(&seed).unwrap()),
            Arc::new(MockTransport::new()),
        );
        collection.transport().set_stalled(true);

        let err = collection.full_sync().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Reconciliation {
                source: RemoteError::Timeout(_),
                ..
            }
        ));
    }

    #[test]
    fn report_counts_replays() {
        let mut report = FullSyncReport::default();
        report.count(SyncVerb::Create);
        report.count(SyncVerb::Delete);
        report.count(SyncVerb::Read);
        assert_eq!(report.replayed(), 2);
    }
}
