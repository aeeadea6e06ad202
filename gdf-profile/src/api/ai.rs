//! AI chat endpoint
//!
//! Signed-in callers spend account quota through their reconciliation
//! driver; guests spend the per-device counter. Quota is consumed before the
//! Generation Service is called and is not refunded when generation fails.

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::auth::{bearer_token, require_device_id, resolve_session};
use crate::error::{ApiError, ApiResult, ProfileError};
use crate::models::Notification;
use crate::reconcile::{UserAction, WriteStatus};
use crate::services::{GenerationOutput, ModelConfig};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    /// Overrides the configured model
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatReply {
    Text { text: String },
    Image { mime_type: String, data: String },
}

impl From<GenerationOutput> for ChatReply {
    fn from(output: GenerationOutput) -> Self {
        match output {
            GenerationOutput::Text(text) => ChatReply::Text { text },
            GenerationOutput::Image { mime_type, bytes } => ChatReply::Image {
                mime_type,
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuotaView {
    pub requests_made: i64,
    pub limit: i64,
    pub remaining: i64,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: ChatReply,
    pub quota: QuotaView,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<WriteStatus>,
}

/// POST /ai/chat
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".to_string()));
    }

    let deps = state.deps();
    let generator = deps
        .generator
        .clone()
        .ok_or_else(|| ApiError::Unavailable("AI chat is not configured".to_string()))?;
    let model_name = request
        .model
        .as_deref()
        .unwrap_or(deps.settings.generation_model.as_str());
    let model = ModelConfig::text(model_name);

    let (quota, notifications, write) = match bearer_token(&headers) {
        Some(token) => {
            let session = resolve_session(&state, token).await?;
            let driver = state.sessions.driver_for(&session).await;
            let outcome = driver.apply_action(UserAction::AiRequest).await?;
            let metadata = &outcome.profile.metadata;
            let quota = QuotaView {
                requests_made: metadata.ai_requests_made,
                limit: metadata.ai_requests_limit,
                remaining: metadata.ai_requests_remaining(),
            };
            (quota, outcome.notifications, Some(outcome.write))
        }
        None => {
            let device = require_device_id(&headers)?;
            let guest = state.guest.try_consume(device).await?;
            let quota = QuotaView {
                requests_made: guest.requests_made,
                limit: guest.limit,
                remaining: guest.remaining,
            };
            (quota, Vec::new(), None)
        }
    };

    debug!(model = %model.model, remaining = quota.remaining, "AI chat request accepted");

    let output = generator.generate(prompt, &model).await.map_err(|e| {
        warn!(error = %e, "AI chat generation failed");
        ApiError::from(ProfileError::from(e))
    })?;

    Ok(Json(ChatResponse {
        reply: output.into(),
        quota,
        notifications,
        write,
    }))
}

pub fn ai_routes() -> Router<AppState> {
    Router::new().route("/ai/chat", post(chat))
}
