//! Server-Sent Events for profile notifications
//!
//! A signed-in client receives only events for its own account. Browsers'
//! EventSource cannot set headers, so the token may also be passed as the
//! `access_token` query parameter. Anonymous clients get a heartbeat-only
//! stream.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use gdf_common::sse::{create_heartbeat_sse_stream, to_sse_event, HEARTBEAT_INTERVAL};
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::auth::{bearer_token, resolve_session};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventStreamQuery {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventStreamQuery>,
) -> ApiResult<Response> {
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(query.access_token);

    let Some(token) = token else {
        return Ok(create_heartbeat_sse_stream("gdf-profile").into_response());
    };

    let session = resolve_session(&state, &token).await?;
    let user_id = session.user.id;
    let mut rx = state.event_bus.subscribe();
    info!(user_id = %user_id, "New SSE client connected to profile events");

    let stream = async_stream::stream! {
        yield Ok::<Event, Infallible>(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    match received {
                        Ok(event) => {
                            if event.user_id() != Some(user_id.as_str()) {
                                continue;
                            }
                            if let Some(frame) = to_sse_event(&event) {
                                yield Ok(frame);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "SSE: Client lagged; events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat"))
        .into_response())
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}
