//! Request identity helpers

use axum::http::{header, HeaderMap};

use crate::error::{ApiError, ApiResult};
use crate::models::Session;
use crate::AppState;

pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Access token from `Authorization: Bearer ...`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Browser-scoped device id for guest quota
pub fn device_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(DEVICE_ID_HEADER)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|d| !d.is_empty())
}

pub fn require_device_id(headers: &HeaderMap) -> ApiResult<&str> {
    device_id(headers).ok_or_else(|| ApiError::BadRequest("missing X-Device-Id header".to_string()))
}

/// Resolve a token to a session; an invalid token is 401
pub async fn resolve_session(state: &AppState, token: &str) -> ApiResult<Session> {
    match state.deps().store.get_session(token).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(ApiError::Unauthorized(
            "invalid or expired access token".to_string(),
        )),
        Err(e) => {
            tracing::warn!(error = %e, "Account store lookup failed");
            state.record_error(e.to_string()).await;
            Err(e.into())
        }
    }
}

pub async fn require_session(state: &AppState, headers: &HeaderMap) -> ApiResult<Session> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
    resolve_session(state, token).await
}
