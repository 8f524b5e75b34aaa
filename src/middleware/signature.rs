use crate::common::response::ApiError;
use crate::common::security::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::state::AppState;
use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::warn;

/// Trigger bodies are small JSON documents.
const MAX_TRIGGER_BYTES: usize = 1024 * 1024;

/// Rejects requests whose HMAC signature does not cover the exact body bytes.
pub async fn verify_signature(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_TRIGGER_BYTES)
        .await
        .map_err(|_| ApiError("Payload too large".to_string(), StatusCode::PAYLOAD_TOO_LARGE))?;

    let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
    if let Err(e) = state
        .verifier
        .verify(header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER), &bytes)
    {
        warn!("Rejected unsigned trigger: {}", e);
        return Err(ApiError(
            format!("Unauthorized: {}", e),
            StatusCode::UNAUTHORIZED,
        ));
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
