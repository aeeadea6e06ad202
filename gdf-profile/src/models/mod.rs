//! Data models

pub mod metadata;
pub mod session;

pub use metadata::{keys, TaskProgress, UserMetadataRecord, TASK_COOLDOWN_MILLIS};
pub use session::{AccountIdentity, AccountUser, Session, SessionEvent};

use serde::{Deserialize, Serialize};

/// Reconciled view of an account handed to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub metadata: UserMetadataRecord,
}

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AchievementUnlocked,
    TaskReady,
    TaskClaimed,
    TaskRefreshed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::AchievementUnlocked => "achievement_unlocked",
            NotificationKind::TaskReady => "task_ready",
            NotificationKind::TaskClaimed => "task_claimed",
            NotificationKind::TaskRefreshed => "task_refreshed",
        }
    }
}

/// Toast-ready message produced by a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Achievement or task id
    pub subject_id: String,
    pub message: String,
}

impl Notification {
    pub fn achievement(id: &str, name: &str, points: i64) -> Self {
        Self {
            kind: NotificationKind::AchievementUnlocked,
            subject_id: id.to_string(),
            message: format!("Achievement unlocked: {} (+{} points)", name, points),
        }
    }

    pub fn task_ready(id: &str, name: &str) -> Self {
        Self {
            kind: NotificationKind::TaskReady,
            subject_id: id.to_string(),
            message: format!("Daily task \"{}\" is complete. Claim your reward!", name),
        }
    }

    pub fn task_claimed(id: &str, name: &str, points: i64) -> Self {
        Self {
            kind: NotificationKind::TaskClaimed,
            subject_id: id.to_string(),
            message: format!("Reward claimed for \"{}\" (+{} points)", name, points),
        }
    }

    pub fn task_refreshed(id: &str, name: &str) -> Self {
        Self {
            kind: NotificationKind::TaskRefreshed,
            subject_id: id.to_string(),
            message: format!("New daily task available: {}", name),
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
