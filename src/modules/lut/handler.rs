use super::dto::{DeleteLutQuery, DeletedLut, ListLutsQuery, LutUpload, LutValidationErrors};
use super::error::LutError;
use super::model::{ColorSpace, LutDescriptor};
use super::parser::LutValidation;
use super::service::{CreateLut, LutRegistry};
use crate::common::response::{ApiError, ApiErrorDetails, ApiResponse, ApiSuccess};
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use tracing::error;
use uuid::Uuid;

fn lut_error_response(e: LutError) -> Response {
    match e {
        LutError::Validation { errors, warnings } => ApiErrorDetails(
            "Invalid LUT file".to_string(),
            LutValidationErrors { errors, warnings },
            StatusCode::UNPROCESSABLE_ENTITY,
        )
        .into_response(),
        LutError::NotFound(_) => ApiError(e.to_string(), StatusCode::NOT_FOUND).into_response(),
        other => {
            error!("LUT catalog failure: {}", other);
            ApiError(other.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<LutUpload, ApiError> {
    let bad_request = |msg: String| ApiError(msg, StatusCode::BAD_REQUEST);
    let mut upload = LutUpload::default();
    let mut has_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                upload.file_name = field.file_name().map(String::from);
                upload.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read file part: {}", e)))?
                    .to_vec();
                has_file = true;
            }
            "name" | "colorSpace" | "metadata" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read {} part: {}", name, e)))?;
                match name.as_str() {
                    "name" => upload.name = Some(text),
                    "colorSpace" => upload.color_space = Some(text),
                    _ => upload.metadata = parse_metadata(&text).map_err(bad_request)?,
                }
            }
            _ => {}
        }
    }

    if !has_file {
        return Err(bad_request("No file field found in multipart request".to_string()));
    }
    Ok(upload)
}

/// Metadata is a flat JSON object; non-string values keep their JSON text.
fn parse_metadata(text: &str) -> Result<HashMap<String, String>, String> {
    if text.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("metadata is not JSON: {}", e))?;
    let object = value
        .as_object()
        .ok_or_else(|| "metadata must be a JSON object".to_string())?;

    Ok(object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect())
}

/// List LUTs
#[utoipa::path(
    get,
    path = "/api/v1/luts",
    params(ListLutsQuery),
    responses(
        (status = 200, description = "Catalog entries sorted by name", body = ApiResponse<Vec<LutDescriptor>>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "LUTs",
    security(("bearer_auth" = []))
)]
pub async fn list_luts(
    State(state): State<AppState>,
    Query(query): Query<ListLutsQuery>,
) -> impl IntoResponse {
    match state.registry.list(query.include_deleted.unwrap_or(false)).await {
        Ok(luts) => ApiSuccess(
            ApiResponse::success(luts, "LUTs retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => lut_error_response(e),
    }
}

/// Get LUT by ID
#[utoipa::path(
    get,
    path = "/api/v1/luts/{id}",
    params(
        ("id" = Uuid, Path, description = "LUT ID")
    ),
    responses(
        (status = 200, description = "LUT details, deleted entries included", body = ApiResponse<LutDescriptor>),
        (status = 404, description = "LUT not found")
    ),
    tag = "LUTs",
    security(("bearer_auth" = []))
)]
pub async fn get_lut(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.registry.get(id).await {
        Ok(Some(lut)) => ApiSuccess(
            ApiResponse::success(lut, "LUT retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Ok(None) => lut_error_response(LutError::NotFound(id)),
        Err(e) => lut_error_response(e),
    }
}

/// Upload a LUT
/// Multipart with a `file` part and optional `name`, `colorSpace` and `metadata` parts
#[utoipa::path(
    post,
    path = "/api/v1/luts",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "LUT registered, or the existing entry for identical content", body = ApiResponse<LutDescriptor>),
        (status = 400, description = "Bad Request"),
        (status = 422, description = "LUT failed validation")
    ),
    tag = "LUTs",
    security(("bearer_auth" = []))
)]
pub async fn create_lut(State(state): State<AppState>, multipart: Multipart) -> impl IntoResponse {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => return e.into_response(),
    };

    let color_space = match upload.color_space.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<ColorSpace>() {
            Ok(space) => Some(space),
            Err(e) => return ApiError(e, StatusCode::BAD_REQUEST).into_response(),
        },
    };

    let mut metadata = upload.metadata;
    if let Some(file_name) = upload.file_name {
        metadata.entry("fileName".to_string()).or_insert(file_name);
    }

    let req = CreateLut {
        name: upload.name,
        color_space,
        metadata,
    };
    match state.registry.create(&upload.bytes, req).await {
        Ok(lut) => ApiSuccess(
            ApiResponse::success(lut, "LUT registered successfully"),
            StatusCode::CREATED,
        )
        .into_response(),
        Err(e) => lut_error_response(e),
    }
}

/// Validate a LUT without storing it
#[utoipa::path(
    post,
    path = "/api/v1/luts/validate",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Validation report", body = ApiResponse<LutValidation>),
        (status = 400, description = "Bad Request")
    ),
    tag = "LUTs",
    security(("bearer_auth" = []))
)]
pub async fn validate_lut(multipart: Multipart) -> impl IntoResponse {
    match read_upload(multipart).await {
        Ok(upload) => {
            let report = LutRegistry::validate(&upload.bytes);
            let message = if report.valid {
                "LUT is valid"
            } else {
                "LUT is invalid"
            };
            ApiSuccess(ApiResponse::success(report, message), StatusCode::OK).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Delete a LUT
#[utoipa::path(
    delete,
    path = "/api/v1/luts/{id}",
    params(
        ("id" = Uuid, Path, description = "LUT ID"),
        DeleteLutQuery
    ),
    responses(
        (status = 200, description = "LUT deleted", body = ApiResponse<DeletedLut>),
        (status = 404, description = "LUT not found")
    ),
    tag = "LUTs",
    security(("bearer_auth" = []))
)]
pub async fn delete_lut(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteLutQuery>,
) -> impl IntoResponse {
    let hard = query.hard.unwrap_or(false);
    match state.registry.delete(id, hard).await {
        Ok(()) => ApiSuccess(
            ApiResponse::success(DeletedLut { id, hard }, "LUT deleted successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => lut_error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_values_are_flattened_to_strings() {
        let parsed = parse_metadata(r#"{"camera": "FX6", "iso": 800, "tags": ["film"]}"#).unwrap();
        assert_eq!(parsed["camera"], "FX6");
        assert_eq!(parsed["iso"], "800");
        assert_eq!(parsed["tags"], r#"["film"]"#);
        assert!(parse_metadata("[1, 2]").is_err());
        assert!(parse_metadata("  ").unwrap().is_empty());
    }
}
