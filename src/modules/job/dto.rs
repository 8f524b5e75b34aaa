use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::model::{JobError, JobProgress, JobRecord, JobRequest, JobResult, JobStatus, Transition};
use crate::media::filter_graph::{GradeOptions, Interpolation};
use crate::modules::lut::model::{ColorSpace, LutDescriptor};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResourceRef {
    #[validate(length(min = 1, message = "Resource id is required"))]
    pub id: String,
    #[serde(rename = "type")]
    #[validate(custom(function = "validate_resource_type"))]
    pub kind: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ScopeRef {
    #[validate(length(min = 1, message = "Id is required"))]
    pub id: String,
}

/// Values submitted through the action form. Select inputs arrive as strings.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerData {
    #[serde(alias = "lut_id")]
    #[validate(custom(function = "validate_uuid"))]
    pub lut_id: Option<String>,
    #[validate(custom(function = "validate_strength"))]
    pub strength: Option<String>,
    #[validate(custom(function = "validate_interpolation"))]
    pub interpolation: Option<String>,
    #[serde(alias = "input_color_space")]
    #[validate(custom(function = "validate_color_space"))]
    pub input_color_space: Option<String>,
    #[serde(alias = "output_color_space")]
    #[validate(custom(function = "validate_color_space"))]
    pub output_color_space: Option<String>,
}

/// Custom-action webhook body.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPayload {
    #[serde(alias = "account_id")]
    #[validate(length(min = 1, message = "Account id is required"))]
    pub account_id: String,
    #[serde(alias = "action_id")]
    pub action_id: Option<String>,
    #[validate(nested)]
    pub resource: ResourceRef,
    #[validate(nested)]
    pub project: Option<ScopeRef>,
    #[validate(nested)]
    pub user: ScopeRef,
    #[validate(nested)]
    pub workspace: Option<ScopeRef>,
    #[serde(alias = "interaction_id")]
    pub interaction_id: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub data: Option<TriggerData>,
}

impl TriggerPayload {
    /// The chosen LUT, once the form has been submitted.
    pub fn selected_lut(&self) -> Option<Uuid> {
        self.data
            .as_ref()
            .and_then(|d| d.lut_id.as_deref())
            .and_then(|id| Uuid::parse_str(id.trim()).ok())
    }

    /// Builds the job request from a validated payload with a selected LUT.
    pub fn to_job_request(&self) -> Option<JobRequest> {
        let lut_id = self.selected_lut()?;
        let data = self.data.as_ref()?;

        let options = GradeOptions {
            strength: data
                .strength
                .as_deref()
                .and_then(|s| s.trim().parse::<f32>().ok()),
            interpolation: data
                .interpolation
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            input_color_space: explicit_color_space(data.input_color_space.as_deref()),
            output_color_space: explicit_color_space(data.output_color_space.as_deref()),
        };

        Some(JobRequest {
            asset_id: self.resource.id.clone(),
            lut_id,
            requester_id: self.user.id.clone(),
            account_id: self.account_id.clone(),
            workspace_id: self.workspace.as_ref().map(|w| w.id.clone()),
            project_id: self.project.as_ref().map(|p| p.id.clone()),
            idempotency_key: self.interaction_id.clone(),
            options,
        })
    }
}

/// `auto`, `unknown` and blanks defer to the probed color space.
fn explicit_color_space(value: Option<&str>) -> Option<ColorSpace> {
    let value = value?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("auto") {
        return None;
    }
    value
        .parse::<ColorSpace>()
        .ok()
        .filter(|space| *space != ColorSpace::Unknown)
}

fn validate_resource_type(kind: &str) -> Result<(), ValidationError> {
    if kind == "file" {
        Ok(())
    } else {
        Err(ValidationError::new("resource_type").with_message("Only file resources can be graded".into()))
    }
}

fn validate_uuid(value: &str) -> Result<(), ValidationError> {
    Uuid::parse_str(value.trim())
        .map(|_| ())
        .map_err(|_| ValidationError::new("uuid").with_message("LUT id must be a UUID".into()))
}

fn validate_strength(value: &str) -> Result<(), ValidationError> {
    match value.trim().parse::<f32>() {
        Ok(s) if s > 0.0 && s <= 1.0 => Ok(()),
        _ => Err(ValidationError::new("strength").with_message("Strength must be in (0, 1]".into())),
    }
}

fn validate_interpolation(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<Interpolation>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("interpolation").with_message("Unknown interpolation mode".into()))
}

fn validate_color_space(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("auto") || value.parse::<ColorSpace>().is_ok() {
        Ok(())
    } else {
        Err(ValidationError::new("color_space").with_message("Unknown color space".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FormOption {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FormField {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub name: String,
    pub options: Vec<FormOption>,
}

impl FormField {
    fn select(label: &str, name: &str, options: Vec<FormOption>) -> Self {
        Self {
            kind: "select".to_string(),
            label: label.to_string(),
            name: name.to_string(),
            options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ActionForm {
    pub title: String,
    pub description: String,
    pub fields: Vec<FormField>,
}

fn option(name: impl Into<String>, value: impl Into<String>) -> FormOption {
    FormOption {
        name: name.into(),
        value: value.into(),
    }
}

impl ActionForm {
    pub fn for_luts(luts: &[LutDescriptor]) -> Self {
        let lut_options = luts
            .iter()
            .filter(|lut| !lut.is_deleted())
            .map(|lut| option(format!("{} ({})", lut.name, lut.color_space), lut.id.to_string()))
            .collect();

        let strengths = [("100%", "1.0"), ("75%", "0.75"), ("50%", "0.5"), ("25%", "0.25")]
            .into_iter()
            .map(|(name, value)| option(name, value))
            .collect();

        let interpolations = [
            ("Trilinear", Interpolation::Trilinear),
            ("Tetrahedral", Interpolation::Tetrahedral),
            ("Nearest", Interpolation::Nearest),
        ]
        .into_iter()
        .map(|(name, mode)| option(name, mode.as_str()))
        .collect();

        Self {
            title: "Apply LUT".to_string(),
            description: "Choose a look to apply. The graded file is added as a new version.".to_string(),
            fields: vec![
                FormField::select("LUT", "lutId", lut_options),
                FormField::select("Strength", "strength", strengths),
                FormField::select("Interpolation", "interpolation", interpolations),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub title: String,
    pub description: String,
    pub job_id: Uuid,
}

impl JobAccepted {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            title: "Grading started".to_string(),
            description: format!("Job {} is running. A new version appears when it finishes.", job_id),
            job_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRequestView {
    pub asset_id: String,
    pub lut_id: Uuid,
    pub account_id: String,
    pub requester_id: String,
    pub options: GradeOptions,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: Option<JobProgress>,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
    pub request: JobRequestView,
    pub attempts: u32,
    pub transitions: Vec<Transition>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            result: job.result,
            error: job.error,
            request: JobRequestView {
                asset_id: job.request.asset_id,
                lut_id: job.request.lut_id,
                account_id: job.request.account_id,
                requester_id: job.request.requester_id,
                options: job.request.options,
            },
            attempts: job.attempts,
            transitions: job.transitions,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(data: serde_json::Value) -> TriggerPayload {
        serde_json::from_value(json!({
            "account_id": "acct-1",
            "actionId": "action-1",
            "resource": {"id": "asset-1", "type": "file"},
            "project": {"id": "proj-1"},
            "user": {"id": "user-1"},
            "workspace": {"id": "ws-1"},
            "interaction_id": "int-1",
            "data": data,
        }))
        .unwrap()
    }

    #[test]
    fn snake_case_aliases_are_accepted() {
        let lut = Uuid::new_v4();
        let p = payload(json!({"lut_id": lut.to_string(), "strength": "0.5"}));
        assert!(p.validate().is_ok());

        let request = p.to_job_request().unwrap();
        assert_eq!(request.lut_id, lut);
        assert_eq!(request.account_id, "acct-1");
        assert_eq!(request.idempotency_key.as_deref(), Some("int-1"));
        assert_eq!(request.options.strength, Some(0.5));
        assert_eq!(request.options.interpolation, Interpolation::Trilinear);
    }

    #[test]
    fn missing_selection_means_form_request() {
        let p = payload(json!(null));
        assert!(p.validate().is_ok());
        assert!(p.selected_lut().is_none());
        assert!(p.to_job_request().is_none());
    }

    #[test]
    fn bad_form_values_are_field_errors() {
        let p = payload(json!({"lutId": "not-a-uuid", "strength": "1.5", "interpolation": "cubic"}));
        let errors = p.validate().unwrap_err();
        let text = errors.to_string();
        assert!(text.contains("lut_id"));
        assert!(text.contains("strength"));
        assert!(text.contains("interpolation"));
    }

    #[test]
    fn only_file_resources_are_accepted() {
        let mut p = payload(json!(null));
        p.resource.kind = "folder".into();
        assert!(p.validate().is_err());
    }

    #[test]
    fn auto_color_space_defers_to_probe() {
        assert_eq!(explicit_color_space(Some("auto")), None);
        assert_eq!(explicit_color_space(Some("Unknown")), None);
        assert_eq!(explicit_color_space(Some("S-Log3")), Some(ColorSpace::SLog3));
    }
}
