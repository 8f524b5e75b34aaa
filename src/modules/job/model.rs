use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::{ErrorKind, PipelineError};
use crate::media::filter_graph::GradeOptions;
use crate::media::probe::MediaMetadata;
use crate::modules::lut::model::{ColorSpace, LutDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Uploading,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        match (self, next) {
            (Pending, Processing) | (Processing, Uploading) | (Uploading, Completed) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Downloading,
    Transcoding,
    Uploading,
}

/// What the trigger asked for. Frozen at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub asset_id: String,
    pub lut_id: Uuid,
    pub requester_id: String,
    pub account_id: String,
    pub workspace_id: Option<String>,
    pub project_id: Option<String>,
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub options: GradeOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub percent: u8,
    pub stage: JobStage,
    pub fps: Option<f32>,
    pub elapsed_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaSummary {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub frame_rate: Option<f64>,
    pub color_space: ColorSpace,
}

impl From<&MediaMetadata> for MediaSummary {
    fn from(meta: &MediaMetadata) -> Self {
        Self {
            codec: meta.video_codec.clone(),
            width: meta.width,
            height: meta.height,
            duration_seconds: meta.duration_seconds,
            frame_rate: meta.frame_rate,
            color_space: meta.color_space,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppliedLut {
    pub id: Uuid,
    pub name: String,
    pub hash: String,
}

impl From<&LutDescriptor> for AppliedLut {
    fn from(lut: &LutDescriptor) -> Self {
        Self {
            id: lut.id,
            name: lut.name.clone(),
            hash: lut.hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub output_asset_id: String,
    pub version_stack_id: String,
    pub input: MediaSummary,
    /// Absent when the rendered file could not be probed.
    pub output: Option<MediaSummary>,
    pub lut_applied: AppliedLut,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct JobError {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<&PipelineError> for JobError {
    fn from(error: &PipelineError) -> Self {
        Self {
            code: error.code().to_string(),
            kind: error.kind(),
            message: error.to_string(),
            retryable: error.retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Transition {
    pub status: JobStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("job {id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub id: Uuid,
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: Uuid,
    pub request: JobRequest,
    pub status: JobStatus,
    pub progress: Option<JobProgress>,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
    pub attempts: u32,
    pub transitions: Vec<Transition>,
    pub created_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

impl JobRecord {
    pub fn new(request: JobRequest) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            request,
            status: JobStatus::Pending,
            progress: None,
            result: None,
            error: None,
            attempts: 0,
            transitions: vec![Transition {
                status: JobStatus::Pending,
                at: now,
            }],
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn transition(&mut self, next: JobStatus, at: OffsetDateTime) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }

        match next {
            JobStatus::Processing => {
                self.attempts += 1;
                self.started_at = Some(at);
            }
            JobStatus::Completed | JobStatus::Failed => {
                self.completed_at = Some(at);
            }
            _ => {}
        }
        self.status = next;
        self.transitions.push(Transition { status: next, at });
        Ok(())
    }

    pub fn history(&self) -> Vec<JobStatus> {
        self.transitions.iter().map(|t| t.status).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JobRequest {
        JobRequest {
            asset_id: "asset-1".into(),
            lut_id: Uuid::new_v4(),
            requester_id: "user-1".into(),
            account_id: "acct-1".into(),
            workspace_id: None,
            project_id: None,
            idempotency_key: None,
            options: GradeOptions::default(),
        }
    }

    #[test]
    fn happy_path_is_recorded_in_order() {
        let mut job = JobRecord::new(request());
        let now = OffsetDateTime::now_utc();
        job.transition(JobStatus::Processing, now).unwrap();
        job.transition(JobStatus::Uploading, now).unwrap();
        job.transition(JobStatus::Completed, now).unwrap();

        assert_eq!(
            job.history(),
            vec![
                JobStatus::Pending,
                JobStatus::Processing,
                JobStatus::Uploading,
                JobStatus::Completed
            ]
        );
        assert_eq!(job.attempts, 1);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn failure_is_reachable_until_terminal() {
        for status in [JobStatus::Pending, JobStatus::Processing, JobStatus::Uploading] {
            assert!(status.can_transition_to(JobStatus::Failed));
        }
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn skipping_a_stage_is_refused() {
        let mut job = JobRecord::new(request());
        let err = job
            .transition(JobStatus::Uploading, OffsetDateTime::now_utc())
            .unwrap_err();
        assert_eq!(err.from, JobStatus::Pending);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.transitions.len(), 1);
    }
}
