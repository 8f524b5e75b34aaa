use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::model::{JobError, JobRecord, JobRequest, JobStatus};
use super::store::JobStore;
use crate::common::error::PipelineError;
use crate::workers::transcoder::GradingPipeline;

/// Accepts jobs and runs each one as a supervised background task.
#[derive(Clone)]
pub struct JobCoordinator {
    store: Arc<JobStore>,
    pipeline: Arc<GradingPipeline>,
    tracker: TaskTracker,
}

impl JobCoordinator {
    pub fn new(pipeline: GradingPipeline) -> Self {
        Self {
            store: Arc::new(JobStore::new()),
            pipeline: Arc::new(pipeline),
            tracker: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> Arc<JobStore> {
        self.store.clone()
    }

    pub fn pipeline(&self) -> &GradingPipeline {
        &self.pipeline
    }

    /// Records the job and detaches its pipeline. Returns before any stage runs.
    pub fn submit(&self, request: JobRequest) -> Uuid {
        let (job_id, created) = self.store.insert(JobRecord::new(request));
        if !created {
            info!(job_id = %job_id, "Duplicate trigger, returning existing job");
            return job_id;
        }

        let store = self.store.clone();
        let pipeline = self.pipeline.clone();
        self.tracker.spawn(async move {
            supervise(job_id, store, pipeline).await;
        });

        info!(job_id = %job_id, "Job accepted");
        job_id
    }

    pub fn status(&self, job_id: Uuid) -> Option<JobRecord> {
        self.store.snapshot(job_id)
    }

    /// Stops accepting work and waits for in-flight jobs to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            info!(jobs = self.tracker.len(), "Waiting for in-flight jobs");
        }
        self.tracker.wait().await;
    }
}

async fn supervise(job_id: Uuid, store: Arc<JobStore>, pipeline: Arc<GradingPipeline>) {
    let work_dir = pipeline.work_dir_for(job_id);

    let worker = {
        let store = store.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run(job_id, &store).await })
    };

    let outcome = match worker.await {
        Ok(outcome) => outcome,
        Err(join_error) => Err(PipelineError::Internal(format!(
            "job task aborted: {}",
            join_error
        ))),
    };

    remove_work_dir(&work_dir).await;

    match outcome {
        Ok(result) => {
            match store.transition_with(job_id, JobStatus::Completed, |job| job.result = Some(result)) {
                Ok(_) => info!(job_id = %job_id, "✅ Job completed"),
                Err(e) => error!(job_id = %job_id, "Could not complete job: {}", e),
            }
        }
        Err(e) => fail(&store, job_id, &e),
    }
}

fn fail(store: &JobStore, job_id: Uuid, cause: &PipelineError) {
    error!(
        job_id = %job_id,
        code = cause.code(),
        retryable = cause.retryable(),
        "❌ Job failed: {}",
        cause
    );
    let error = JobError::from(cause);
    if let Err(e) = store.transition_with(job_id, JobStatus::Failed, |job| job.error = Some(error)) {
        warn!(job_id = %job_id, "Could not mark job failed: {}", e);
    }
}

async fn remove_work_dir(dir: &Path) {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove work dir {}: {}", dir.display(), e),
    }
}
