//! Minimal surface of the remote asset store that the grading pipeline needs.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::error::PipelineError;
pub use crate::common::transfer::UploadChunk;

#[derive(Debug, Error)]
pub enum AssetStoreError {
    #[error("asset store returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("asset store unreachable: {0}")]
    Network(String),
    #[error("unexpected asset store response: {0}")]
    Decode(String),
    #[error("invalid asset store base URL: {0}")]
    InvalidBaseUrl(String),
}

impl AssetStoreError {
    pub fn retryable(&self) -> bool {
        match self {
            AssetStoreError::Http { status, .. } => *status >= 500,
            AssetStoreError::Network(_) => true,
            AssetStoreError::Decode(_) | AssetStoreError::InvalidBaseUrl(_) => false,
        }
    }
}

impl From<AssetStoreError> for PipelineError {
    fn from(error: AssetStoreError) -> Self {
        let retryable = error.retryable();
        PipelineError::Transport {
            message: error.to_string(),
            retryable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
}

/// Destination-issued plan for a new file: upload exactly these chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPlan {
    pub file_id: String,
    pub media_type: Option<String>,
    pub chunks: Vec<UploadChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionStack {
    pub id: String,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get_asset(&self, account_id: &str, asset_id: &str) -> Result<RemoteAsset, AssetStoreError>;

    /// Download URL of the original (untranscoded) media.
    async fn original_media_url(&self, account_id: &str, asset_id: &str) -> Result<String, AssetStoreError>;

    async fn create_upload(
        &self,
        account_id: &str,
        folder_id: &str,
        name: &str,
        size: u64,
    ) -> Result<UploadPlan, AssetStoreError>;

    async fn create_version_stack(
        &self,
        account_id: &str,
        folder_id: &str,
        file_ids: &[String],
    ) -> Result<VersionStack, AssetStoreError>;

    async fn post_comment(&self, account_id: &str, file_id: &str, text: &str) -> Result<(), AssetStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let busy = AssetStoreError::Http {
            status: 503,
            body: "busy".into(),
        };
        let denied = AssetStoreError::Http {
            status: 403,
            body: "denied".into(),
        };
        assert!(PipelineError::from(busy).retryable());
        assert!(!PipelineError::from(denied).retryable());
        assert!(AssetStoreError::Network("reset".into()).retryable());
    }
}
