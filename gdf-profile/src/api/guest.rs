//! Guest quota endpoint

use axum::{extract::State, http::HeaderMap, routing::get, Json, Router};

use crate::api::auth::require_device_id;
use crate::error::ApiResult;
use crate::guest::GuestQuota;
use crate::AppState;

/// GET /guest/quota
pub async fn get_guest_quota(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<GuestQuota>> {
    let device = require_device_id(&headers)?;
    Ok(Json(state.guest.quota(device).await?))
}

pub fn guest_routes() -> Router<AppState> {
    Router::new().route("/guest/quota", get(get_guest_quota))
}
