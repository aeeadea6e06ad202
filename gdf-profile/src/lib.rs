//! gdf-profile library interface
//!
//! User-state reconciliation and gamification bookkeeping for GameDev
//! Factory accounts, exposed over HTTP + SSE.

pub mod api;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod guest;
pub mod models;
pub mod reconcile;
pub mod services;

pub use crate::error::{ApiError, ApiResult, ProfileError};

use axum::Router;
use chrono::{DateTime, Utc};
use gdf_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::guest::GuestQuotaCache;
use crate::reconcile::{DriverDeps, SessionRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Per-user reconciliation drivers
    pub sessions: Arc<SessionRegistry>,
    /// Per-device guest AI counters
    pub guest: Arc<GuestQuotaCache>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// `deps.events` must be the same bus as `event_bus` for SSE to see
    /// driver notifications
    pub fn new(db: SqlitePool, deps: DriverDeps) -> Self {
        let guest_limit = deps.settings.quota.guest_limit;
        Self {
            guest: Arc::new(GuestQuotaCache::new(db.clone(), guest_limit)),
            event_bus: deps.events.clone(),
            sessions: Arc::new(SessionRegistry::new(deps)),
            db,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn deps(&self) -> &DriverDeps {
        self.sessions.deps()
    }

    /// Remember an upstream failure for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::session_routes())
        .merge(api::profile_routes())
        .merge(api::admin_routes())
        .merge(api::ai_routes())
        .merge(api::guest_routes())
        .merge(api::event_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
