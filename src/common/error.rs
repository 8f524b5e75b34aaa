use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Broad class of a job failure, used by operators to separate capacity
/// problems from correctness problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transport,
    Processing,
    ResourceLimit,
    Internal,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("LUT {0} not found or deleted")]
    LutNotFound(Uuid),
    #[error("transfer failed: {message}")]
    Transport { message: String, retryable: bool },
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("transcode exited with {status}: {diagnostics}")]
    Transcode { status: String, diagnostics: String },
    #[error("media probe failed: {0}")]
    Probe(String),
    #[error("asset is {size} bytes, limit is {limit}")]
    AssetTooLarge { size: u64, limit: u64 },
    #[error("transcode exceeded {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transport(message: impl Into<String>, retryable: bool) -> Self {
        PipelineError::Transport {
            message: message.into(),
            retryable,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) | PipelineError::LutNotFound(_) => ErrorKind::Validation,
            PipelineError::Transport { .. } | PipelineError::Spawn { .. } => ErrorKind::Transport,
            PipelineError::Transcode { .. } | PipelineError::Probe(_) | PipelineError::Io { .. } => {
                ErrorKind::Processing
            }
            PipelineError::AssetTooLarge { .. } | PipelineError::Timeout(_) => {
                ErrorKind::ResourceLimit
            }
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "VALIDATION_ERROR",
            PipelineError::LutNotFound(_) => "LUT_NOT_FOUND",
            PipelineError::Transport { .. } => "TRANSPORT_ERROR",
            PipelineError::Spawn { .. } => "SPAWN_ERROR",
            PipelineError::Transcode { .. } => "TRANSCODE_FAILED",
            PipelineError::Probe(_) => "PROBE_FAILED",
            PipelineError::AssetTooLarge { .. } => "ASSET_TOO_LARGE",
            PipelineError::Timeout(_) => "TRANSCODE_TIMEOUT",
            PipelineError::Io { .. } => "IO_ERROR",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            PipelineError::Transport { retryable, .. } => *retryable,
            PipelineError::Spawn { .. } => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(error: reqwest::Error) -> Self {
        let retryable = error
            .status()
            .map(|status| status.is_server_error())
            .unwrap_or(true);
        PipelineError::Transport {
            message: error.to_string(),
            retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_limits_have_distinct_codes() {
        let size = PipelineError::AssetTooLarge { size: 10, limit: 5 };
        let timeout = PipelineError::Timeout(Duration::from_secs(60));
        assert_eq!(size.kind(), ErrorKind::ResourceLimit);
        assert_eq!(timeout.kind(), ErrorKind::ResourceLimit);
        assert_ne!(size.code(), timeout.code());
        assert!(!size.retryable());
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(PipelineError::transport("reset", true).retryable());
        assert!(!PipelineError::transport("403", false).retryable());
        let spawn = PipelineError::Spawn {
            program: "ffmpeg".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(spawn.retryable());
        assert_eq!(spawn.kind(), ErrorKind::Transport);
        assert!(!PipelineError::Validation("bad".into()).retryable());
        let failed = PipelineError::Transcode {
            status: "exit status: 1".into(),
            diagnostics: "boom".into(),
        };
        assert_eq!(failed.kind(), ErrorKind::Processing);
    }
}
