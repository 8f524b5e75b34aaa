use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use super::model::{InvalidTransition, JobRecord, JobStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("job {0} does not exist")]
    UnknownJob(Uuid),
    #[error(transparent)]
    Invalid(#[from] InvalidTransition),
}

#[derive(Default)]
struct Jobs {
    records: HashMap<Uuid, JobRecord>,
    idempotency: HashMap<String, Uuid>,
}

/// In-memory job table.
///
/// Every write clones the record, mutates the clone and swaps it in whole, so
/// readers only ever see complete snapshots. Only a job's own task writes it.
#[derive(Default)]
pub struct JobStore {
    inner: RwLock<Jobs>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Jobs> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Jobs> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a new record unless its idempotency key is already known.
    /// Returns the id to report and whether a new job was created.
    pub fn insert(&self, record: JobRecord) -> (Uuid, bool) {
        let mut jobs = self.write();

        if let Some(key) = record.request.idempotency_key.as_ref() {
            if let Some(existing) = jobs.idempotency.get(key).copied() {
                if jobs.records.contains_key(&existing) {
                    return (existing, false);
                }
            }
            jobs.idempotency.insert(key.clone(), record.id);
        }

        let id = record.id;
        jobs.records.insert(id, record);
        (id, true)
    }

    pub fn snapshot(&self, id: Uuid) -> Option<JobRecord> {
        self.read().records.get(&id).cloned()
    }

    pub fn update<F>(&self, id: Uuid, mutate: F) -> Option<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.write();
        let mut next = jobs.records.get(&id)?.clone();
        mutate(&mut next);
        jobs.records.insert(id, next.clone());
        Some(next)
    }

    /// Moves a job along its state machine. Refused moves are logged and leave
    /// the record untouched.
    pub fn transition(&self, id: Uuid, next: JobStatus) -> Result<JobRecord, TransitionError> {
        self.transition_with(id, next, |_| {})
    }

    /// Moves a job and applies `mutate` to it under one write lock, so readers
    /// see either neither change or both. A refused move applies nothing.
    pub fn transition_with<F>(
        &self,
        id: Uuid,
        next: JobStatus,
        mutate: F,
    ) -> Result<JobRecord, TransitionError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.write();
        let mut updated = jobs
            .records
            .get(&id)
            .cloned()
            .ok_or(TransitionError::UnknownJob(id))?;

        if let Err(e) = updated.transition(next, OffsetDateTime::now_utc()) {
            warn!(job_id = %id, "{}", e);
            return Err(e.into());
        }
        mutate(&mut updated);
        if next == JobStatus::Completed {
            if let Some(progress) = updated.progress.as_mut() {
                progress.percent = 100;
            }
        }
        jobs.records.insert(id, updated.clone());
        Ok(updated)
    }

    /// Drops finished jobs older than `retention`, along with their idempotency keys.
    pub fn purge_expired(&self, now: OffsetDateTime, retention: Duration) -> usize {
        let mut jobs = self.write();
        let expired: Vec<Uuid> = jobs
            .records
            .values()
            .filter(|job| job.status.is_terminal())
            .filter(|job| {
                job.completed_at
                    .map(|done| now - done > retention)
                    .unwrap_or(false)
            })
            .map(|job| job.id)
            .collect();

        for id in &expired {
            jobs.records.remove(id);
        }
        jobs.idempotency.retain(|_, id| !expired.contains(id));
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::common::error::PipelineError;
    use crate::media::filter_graph::GradeOptions;
    use crate::modules::job::model::{JobError, JobRequest};

    fn record(key: Option<&str>) -> JobRecord {
        JobRecord::new(JobRequest {
            asset_id: "asset-1".into(),
            lut_id: Uuid::new_v4(),
            requester_id: "user-1".into(),
            account_id: "acct-1".into(),
            workspace_id: None,
            project_id: None,
            idempotency_key: key.map(String::from),
            options: GradeOptions::default(),
        })
    }

    #[test]
    fn redelivered_trigger_returns_existing_job() {
        let store = JobStore::new();
        let (first, created) = store.insert(record(Some("interaction-7")));
        assert!(created);

        let (second, created) = store.insert(record(Some("interaction-7")));
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);

        let (_, created) = store.insert(record(None));
        assert!(created);
    }

    #[test]
    fn snapshots_are_detached_copies() {
        let store = JobStore::new();
        let (id, _) = store.insert(record(None));
        let before = store.snapshot(id).unwrap();

        store.transition(id, JobStatus::Processing).unwrap();

        assert_eq!(before.status, JobStatus::Pending);
        assert_eq!(store.snapshot(id).unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn refused_transition_leaves_record_alone() {
        let store = JobStore::new();
        let (id, _) = store.insert(record(None));
        assert!(store.transition(id, JobStatus::Completed).is_err());
        assert_eq!(store.snapshot(id).unwrap().transitions.len(), 1);
    }

    #[test]
    fn purge_only_drops_old_terminal_jobs() {
        let store = JobStore::new();
        let (done, _) = store.insert(record(Some("done")));
        let (running, _) = store.insert(record(None));
        store.transition(done, JobStatus::Failed).unwrap();
        store.transition(running, JobStatus::Processing).unwrap();

        let later = OffsetDateTime::now_utc() + Duration::from_secs(120);
        assert_eq!(store.purge_expired(later, Duration::from_secs(3600)), 0);
        assert_eq!(store.purge_expired(later, Duration::from_secs(60)), 1);

        assert!(store.snapshot(done).is_none());
        assert!(store.snapshot(running).is_some());

        let (fresh, created) = store.insert(record(Some("done")));
        assert!(created);
        assert_ne!(fresh, done);
    }

    fn failure() -> JobError {
        JobError::from(&PipelineError::Probe("no video stream".into()))
    }

    #[test]
    fn refused_transition_with_drops_the_payload() {
        let store = JobStore::new();
        let (id, _) = store.insert(record(None));

        let refused = store.transition_with(id, JobStatus::Completed, |job| job.error = Some(failure()));
        assert!(refused.is_err());

        let job = store.snapshot(id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.error.is_none());
    }

    #[test]
    fn status_and_payload_land_together() {
        let store = Arc::new(JobStore::new());
        let ids: Vec<Uuid> = (0..200).map(|_| store.insert(record(None)).0).collect();
        for id in &ids {
            store.transition(*id, JobStatus::Processing).unwrap();
        }

        std::thread::scope(|scope| {
            let reader = {
                let store = store.clone();
                let ids = ids.clone();
                scope.spawn(move || {
                    for _ in 0..50 {
                        for id in &ids {
                            let job = store.snapshot(*id).unwrap();
                            assert_eq!(job.error.is_some(), job.status == JobStatus::Failed);
                        }
                    }
                })
            };

            for id in &ids {
                store
                    .transition_with(*id, JobStatus::Failed, |job| job.error = Some(failure()))
                    .unwrap();
            }
            reader.join().unwrap();
        });

        assert!(ids.iter().all(|id| store.snapshot(*id).unwrap().error.is_some()));
    }
}
