//! Admin endpoints
//!
//! Premium is granted through an account store procedure that runs with
//! admin privileges; this service never writes another account's record
//! itself. A target with a live driver is reconciled immediately, anyone
//! else picks the grant up on their next pass.

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::api::auth::require_session;
use crate::error::{ApiError, ApiResult};
use crate::models::UserProfile;
use crate::AppState;

/// Store procedure that sets `is_premium` and `premium_expires_at`
pub const GRANT_PREMIUM_PROCEDURE: &str = "grant_premium";

/// Grant length when the request names no expiry
pub const DEFAULT_PREMIUM_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct PremiumGrantRequest {
    pub user_id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PremiumGrantResponse {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    /// Target's reconciled profile, when the target is online
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<UserProfile>,
}

/// POST /admin/premium
pub async fn grant_premium(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PremiumGrantRequest>,
) -> ApiResult<Json<PremiumGrantResponse>> {
    let session = require_session(&state, &headers).await?;
    let deps = state.deps();
    if !deps.admins.is_admin(session.user.email.as_deref()) {
        warn!(user_id = %session.user.id, "Premium grant refused: not an admin");
        return Err(ApiError::Forbidden("admin access required".to_string()));
    }

    let now = (deps.clock)();
    let expires_at = request
        .expires_at
        .unwrap_or(now + Duration::days(DEFAULT_PREMIUM_DAYS));
    if expires_at <= now {
        return Err(ApiError::BadRequest(
            "expires_at must be in the future".to_string(),
        ));
    }

    let args = json!({
        "target_user_id": request.user_id,
        "expires_at": expires_at,
    });
    deps.store
        .call_remote_procedure(Some(&session), GRANT_PREMIUM_PROCEDURE, &args)
        .await?;
    info!(
        admin = %session.user.id,
        target = %request.user_id,
        expires_at = %expires_at,
        "Premium granted"
    );

    let profile = match state.sessions.get(&request.user_id).await {
        Some(driver) => match driver.resync().await {
            Ok(outcome) => Some(outcome.profile),
            Err(e) => {
                warn!(target = %request.user_id, error = %e, "Could not resync target after grant");
                None
            }
        },
        None => None,
    };

    Ok(Json(PremiumGrantResponse {
        user_id: request.user_id,
        expires_at,
        profile,
    }))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/premium", post(grant_premium))
}
