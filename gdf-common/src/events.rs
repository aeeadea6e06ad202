//! Event types for the GDF event system
//!
//! Provides shared event definitions and the EventBus used to fan profile
//! notifications out to SSE clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// GDF event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Every event that concerns one account carries its `user_id` so streams
/// can be filtered per subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GdfEvent {
    /// Auth session changed (sign-in, sign-out, token refresh, password recovery)
    SessionChanged {
        /// Account id; `None` for a sign-out with no known account
        user_id: Option<String>,
        /// Session event name as sent by the UI (`signed_in`, `signed_out`, ...)
        event: String,
        timestamp: DateTime<Utc>,
    },

    /// User-facing notification (achievement unlocked, task ready, ...)
    NotificationRaised {
        user_id: String,
        /// Notification kind (`achievement_unlocked`, `task_ready`, `task_claimed`, `task_refreshed`)
        kind: String,
        /// Human-readable message for a toast
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Reconciled profile was written to the account store
    ProfileSynced {
        user_id: String,
        activity_points: i64,
        ai_requests_made: i64,
        ai_requests_limit: i64,
        timestamp: DateTime<Utc>,
    },

    /// Account store write failed; local state kept, not persisted
    ProfileWriteFailed {
        user_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl GdfEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            GdfEvent::SessionChanged { .. } => "SessionChanged",
            GdfEvent::NotificationRaised { .. } => "NotificationRaised",
            GdfEvent::ProfileSynced { .. } => "ProfileSynced",
            GdfEvent::ProfileWriteFailed { .. } => "ProfileWriteFailed",
        }
    }

    /// Account the event belongs to, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            GdfEvent::SessionChanged { user_id, .. } => user_id.as_deref(),
            GdfEvent::NotificationRaised { user_id, .. }
            | GdfEvent::ProfileSynced { user_id, .. }
            | GdfEvent::ProfileWriteFailed { user_id, .. } => Some(user_id),
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper around `tokio::sync::broadcast`. Slow subscribers lose the
/// oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GdfEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<GdfEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: GdfEvent) -> Result<usize, broadcast::error::SendError<GdfEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GdfEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(user: &str) -> GdfEvent {
        GdfEvent::NotificationRaised {
            user_id: user.to_string(),
            kind: "achievement_unlocked".to_string(),
            message: "Achievement unlocked".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        assert!(bus.emit(notification("u1")).is_err());
        // Lossy variant must not panic
        bus.emit_lossy(notification("u1"));
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(notification("u1")).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.user_id(), Some("u1"));
        assert_eq!(received.event_type(), "NotificationRaised");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(notification("u2")).unwrap();
        assert_eq!(json["type"], "NotificationRaised");
        assert_eq!(json["user_id"], "u2");
    }

    #[test]
    fn test_signed_out_event_has_no_user() {
        let event = GdfEvent::SessionChanged {
            user_id: None,
            event: "signed_out".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.user_id(), None);
    }
}
