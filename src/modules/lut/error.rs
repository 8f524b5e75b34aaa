use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LutError {
    #[error("invalid LUT file: {}", errors.join("; "))]
    Validation {
        errors: Vec<String>,
        warnings: Vec<String>,
    },
    #[error("LUT {0} not found")]
    NotFound(Uuid),
    #[error("LUT storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("catalog error: {0}")]
    Catalog(#[from] anyhow::Error),
}

impl LutError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LutError::Storage {
            path: path.into(),
            source,
        }
    }
}
