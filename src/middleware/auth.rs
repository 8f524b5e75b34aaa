use crate::common::response::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

/// Guards catalog administration behind `ADMIN_API_TOKEN`.
pub async fn admin_guard(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.admin_api_token.as_deref() else {
        return Err(ApiError(
            "Unauthorized: admin API is disabled".to_string(),
            StatusCode::UNAUTHORIZED,
        ));
    };

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            ApiError(
                "Unauthorized: Missing or invalid token".to_string(),
                StatusCode::UNAUTHORIZED,
            )
        })?;

    // Fixed-length digests, never the raw tokens.
    if Sha256::digest(token.as_bytes()) != Sha256::digest(expected.as_bytes()) {
        return Err(ApiError(
            "Unauthorized: Invalid token".to_string(),
            StatusCode::UNAUTHORIZED,
        ));
    }

    Ok(next.run(req).await)
}
