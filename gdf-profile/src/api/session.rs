//! Auth session change endpoint
//!
//! The UI forwards every auth state change here. Sign-in events reconcile
//! the account; sign-out releases the account's driver and restores the
//! guest counter for the device. Only the bearer session identifies the
//! account; a sign-out without a valid token leaves the driver to idle
//! eviction.

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use gdf_common::events::GdfEvent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::auth::{bearer_token, device_id, resolve_session};
use crate::error::{ApiError, ApiResult};
use crate::guest::GuestQuota;
use crate::models::{Notification, SessionEvent, UserProfile};
use crate::reconcile::WriteStatus;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionChangeRequest {
    pub event: SessionEvent,
}

#[derive(Debug, Default, Serialize)]
pub struct SessionChangeResponse {
    pub event: Option<SessionEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<UserProfile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<WriteStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_quota: Option<GuestQuota>,
}

/// POST /session
pub async fn session_changed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SessionChangeRequest>,
) -> ApiResult<Json<SessionChangeResponse>> {
    let event = request.event;
    let mut response = SessionChangeResponse {
        event: Some(event),
        ..Default::default()
    };

    let user_id = match event {
        SessionEvent::SignedIn | SessionEvent::InitialSession => {
            let token = bearer_token(&headers)
                .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
            let session = resolve_session(&state, token).await?;
            let user_id = session.user.id.clone();

            if let Some(device) = device_id(&headers) {
                state.guest.on_sign_in(device).await;
            }

            let driver = state.sessions.driver_for(&session).await;
            let outcome = driver
                .reconcile(session, event == SessionEvent::SignedIn)
                .await?;
            response.profile = Some(outcome.profile);
            response.notifications = outcome.notifications;
            response.write = Some(outcome.write);
            Some(user_id)
        }
        SessionEvent::TokenRefreshed | SessionEvent::PasswordRecovery => {
            match bearer_token(&headers) {
                Some(token) => {
                    let session = resolve_session(&state, token).await?;
                    let driver = state.sessions.driver_for(&session).await;
                    response.profile = driver.cached_profile().await;
                    Some(session.user.id)
                }
                None => None,
            }
        }
        SessionEvent::SignedOut => {
            let user_id = match bearer_token(&headers) {
                Some(token) => signed_out_account(&state, token).await,
                None => None,
            };
            if let Some(user_id) = user_id.as_deref() {
                state.sessions.release(user_id).await;
            }
            if let Some(device) = device_id(&headers) {
                response.guest_quota = Some(state.guest.on_sign_out(device).await?);
            }
            user_id
        }
    };

    info!(event = event.as_str(), user_id = ?user_id, "Session changed");
    state.event_bus.emit_lossy(GdfEvent::SessionChanged {
        user_id,
        event: event.as_str().to_string(),
        timestamp: gdf_common::time::now(),
    });

    Ok(Json(response))
}

/// Account behind a sign-out token, if the store still accepts it
async fn signed_out_account(state: &AppState, token: &str) -> Option<String> {
    match state.deps().store.get_session(token).await {
        Ok(Some(session)) => Some(session.user.id),
        Ok(None) => {
            debug!("Sign-out token already revoked");
            None
        }
        Err(e) => {
            warn!(error = %e, "Could not resolve sign-out token");
            None
        }
    }
}

pub fn session_routes() -> Router<AppState> {
    Router::new().route("/session", post(session_changed))
}
