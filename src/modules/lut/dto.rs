use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListLutsQuery {
    /// Include soft-deleted entries.
    pub include_deleted: Option<bool>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DeleteLutQuery {
    /// Purge the entry and its file instead of soft-deleting.
    pub hard: Option<bool>,
}

#[derive(Debug, Default)]
pub struct LutUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
    pub name: Option<String>,
    pub color_space: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LutValidationErrors {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletedLut {
    pub id: Uuid,
    pub hard: bool,
}
