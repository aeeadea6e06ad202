//! Profile endpoints: reconcile, actions, task claim and refresh

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

use crate::api::auth::require_session;
use crate::error::{ApiError, ApiResult};
use crate::reconcile::{ReconcileOutcome, UserAction};
use crate::AppState;

/// GET /profile
///
/// Reconciles the stored record; writes only when something was derived.
pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ReconcileOutcome>> {
    let session = require_session(&state, &headers).await?;
    let driver = state.sessions.driver_for(&session).await;
    let outcome = driver.reconcile(session, false).await?;
    Ok(Json(outcome))
}

/// POST /profile/actions
///
/// AI requests are counted by `/ai/chat` only; premium is granted through
/// `/admin/premium`.
pub async fn post_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(action): Json<UserAction>,
) -> ApiResult<Json<ReconcileOutcome>> {
    if action == UserAction::AiRequest {
        return Err(ApiError::BadRequest(
            "AI requests are recorded by POST /ai/chat".to_string(),
        ));
    }

    let session = require_session(&state, &headers).await?;
    let driver = state.sessions.driver_for(&session).await;
    let outcome = driver.apply_action(action).await?;
    Ok(Json(outcome))
}

/// POST /profile/tasks/:task_id/claim
pub async fn claim_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> ApiResult<Json<ReconcileOutcome>> {
    let session = require_session(&state, &headers).await?;
    let driver = state.sessions.driver_for(&session).await;
    let outcome = driver.claim_task(&task_id).await?;
    Ok(Json(outcome))
}

/// POST /profile/tasks/:task_id/refresh
///
/// Regenerates only this task, and only once its cooldown has expired.
pub async fn refresh_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> ApiResult<Json<ReconcileOutcome>> {
    let session = require_session(&state, &headers).await?;
    let driver = state.sessions.driver_for(&session).await;
    let outcome = driver.refresh_task(&task_id).await?;
    Ok(Json(outcome))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile))
        .route("/profile/actions", post(post_action))
        .route("/profile/tasks/:task_id/claim", post(claim_task))
        .route("/profile/tasks/:task_id/refresh", post(refresh_task))
}
