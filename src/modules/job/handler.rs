use super::dto::{ActionForm, JobAccepted, JobStatusResponse, TriggerPayload};
use crate::common::response::{ApiError, ApiErrorDetails, ApiResponse, ApiSuccess};
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

/// Custom action trigger: returns the LUT form, or starts a grading job
#[utoipa::path(
    post,
    path = "/api/v1/actions/apply-lut",
    request_body = TriggerPayload,
    responses(
        (status = 200, description = "Form to fill in, or the accepted job", body = JobAccepted),
        (status = 401, description = "Missing, stale or invalid signature"),
        (status = 422, description = "Malformed trigger payload")
    ),
    params(
        ("x-signature" = String, Header, description = "`<scheme>=<hex hmac>`"),
        ("x-request-timestamp" = String, Header, description = "Unix seconds")
    ),
    tag = "Actions"
)]
pub async fn apply_lut(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let payload: TriggerPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return ApiError(
                format!("Malformed trigger payload: {}", e),
                StatusCode::UNPROCESSABLE_ENTITY,
            )
            .into_response();
        }
    };

    if let Err(errors) = payload.validate() {
        warn!("Rejected trigger: {}", errors);
        return ApiErrorDetails(
            "Invalid trigger payload".to_string(),
            errors,
            StatusCode::UNPROCESSABLE_ENTITY,
        )
        .into_response();
    }

    match payload.to_job_request() {
        Some(request) => {
            let job_id = state.jobs.submit(request);
            (StatusCode::OK, Json(JobAccepted::new(job_id))).into_response()
        }
        None => match state.registry.list(false).await {
            Ok(luts) => (StatusCode::OK, Json(ActionForm::for_luts(&luts))).into_response(),
            Err(e) => ApiError(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
        },
    }
}

/// Get job status
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job snapshot", body = ApiResponse<JobStatusResponse>),
        (status = 404, description = "Unknown or purged job")
    ),
    tag = "Jobs"
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.jobs.status(id) {
        Some(job) => ApiSuccess(
            ApiResponse::success(JobStatusResponse::from(job), "Job retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        None => ApiError("Job not found".to_string(), StatusCode::NOT_FOUND).into_response(),
    }
}
