//! Typed user metadata record
//!
//! The account store keeps one JSON object per user. This is its typed form
//! after normalization. Keys the service does not own (OAuth profile fields,
//! avatar, UI preferences) are carried in `extra` so a full-record write
//! never drops them.

use chrono::{DateTime, NaiveDate, Utc};
use gdf_common::time::MILLIS_PER_DAY;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Claim cooldown before a daily task is regenerated
pub const TASK_COOLDOWN_MILLIS: i64 = MILLIS_PER_DAY;

/// Field names owned by this service
pub mod keys {
    pub const DISPLAY_NAME: &str = "display_name";
    pub const USER_VIHT_ID: &str = "user_viht_id";
    pub const CLIENT_KEY: &str = "client_key";
    pub const IS_PREMIUM: &str = "is_premium";
    pub const PREMIUM_EXPIRES_AT: &str = "premium_expires_at";
    pub const AI_REQUESTS_MADE: &str = "ai_requests_made";
    pub const AI_REQUESTS_LIMIT: &str = "ai_requests_limit";
    pub const LAST_REQUEST_RESET_AT: &str = "last_request_reset_at";
    pub const ACTIVITY_POINTS: &str = "activity_points";
    pub const AWARDED_ACHIEVEMENT_POINTS_LOG: &str = "awarded_achievement_points_log";
    pub const COMPLETED_SECRET_ACHIEVEMENTS: &str = "completed_secret_achievements";
    pub const SUPPORT_TICKETS_CREATED: &str = "support_tickets_created";
    pub const DAILY_TASK_PROGRESS: &str = "daily_task_progress";
    pub const TERMS_AGREED_AT: &str = "terms_agreed_at";

    pub const ALL: [&str; 14] = [
        DISPLAY_NAME,
        USER_VIHT_ID,
        CLIENT_KEY,
        IS_PREMIUM,
        PREMIUM_EXPIRES_AT,
        AI_REQUESTS_MADE,
        AI_REQUESTS_LIMIT,
        LAST_REQUEST_RESET_AT,
        ACTIVITY_POINTS,
        AWARDED_ACHIEVEMENT_POINTS_LOG,
        COMPLETED_SECRET_ACHIEVEMENTS,
        SUPPORT_TICKETS_CREATED,
        DAILY_TASK_PROGRESS,
        TERMS_AGREED_AT,
    ];
}

/// Normalized per-account metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMetadataRecord {
    pub display_name: String,
    pub user_viht_id: String,
    pub client_key: String,
    pub is_premium: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub ai_requests_made: i64,
    pub ai_requests_limit: i64,
    pub last_request_reset_at: Option<DateTime<Utc>>,
    pub activity_points: i64,
    /// Achievement id -> true; presence is the only at-most-once guard
    pub awarded_achievement_points_log: BTreeMap<String, bool>,
    pub completed_secret_achievements: BTreeSet<String>,
    pub support_tickets_created: i64,
    pub daily_task_progress: Vec<TaskProgress>,
    pub terms_agreed_at: Option<DateTime<Utc>>,

    /// Keys not owned by this service, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserMetadataRecord {
    /// Full-record patch for the account store
    pub fn to_patch(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct of plain fields always serializes to an object
            _ => Map::new(),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskProgress> {
        self.daily_task_progress.iter().find(|t| t.task_id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut TaskProgress> {
        self.daily_task_progress
            .iter_mut()
            .find(|t| t.task_id == task_id)
    }

    pub fn has_award(&self, achievement_id: &str) -> bool {
        self.awarded_achievement_points_log.contains_key(achievement_id)
    }

    /// Requests left in the current window (never negative)
    pub fn ai_requests_remaining(&self) -> i64 {
        (self.ai_requests_limit - self.ai_requests_made).max(0)
    }
}

/// Progress on one daily task definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: String,
    pub current_value: i64,
    pub completed_today: bool,
    pub claimed_today: bool,
    /// Serialized as `YYYY-MM-DD`
    pub last_progress_date: NaiveDate,
    /// Epoch millis of the last claim; starts the 24h cooldown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_generated_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_generated_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_generated_points: Option<i64>,
    #[serde(default)]
    pub is_ai_refreshed: bool,
}

impl TaskProgress {
    /// Zero-progress row dated `today`
    pub fn fresh(task_id: &str, today: NaiveDate) -> Self {
        Self {
            task_id: task_id.to_string(),
            current_value: 0,
            completed_today: false,
            claimed_today: false,
            last_progress_date: today,
            claimed_at_timestamp: None,
            ai_generated_name: None,
            ai_generated_description: None,
            ai_generated_points: None,
            is_ai_refreshed: false,
        }
    }

    /// Claimed less than 24h ago
    pub fn in_active_cooldown(&self, now_millis: i64) -> bool {
        matches!(self.claimed_at_timestamp, Some(claimed) if now_millis - claimed < TASK_COOLDOWN_MILLIS)
    }

    /// Claimed at least 24h ago and not yet regenerated
    pub fn cooldown_expired(&self, now_millis: i64) -> bool {
        matches!(self.claimed_at_timestamp, Some(claimed) if now_millis - claimed >= TASK_COOLDOWN_MILLIS)
    }

    pub fn can_claim(&self) -> bool {
        self.completed_today && !self.claimed_today
    }

    /// Zero progress and flags for a new day
    pub fn reset_progress(&mut self, today: NaiveDate) {
        self.current_value = 0;
        self.completed_today = false;
        self.claimed_today = false;
        self.last_progress_date = today;
    }
}
