//! Metadata normalizer
//!
//! Turns the raw, loosely typed metadata blob into a `UserMetadataRecord`.
//! Every owned field ends up present and well-typed; anything absent,
//! mistyped or stale is replaced and reported through `changed`. Corrupt
//! values are recovered here rather than failing the pass.
//!
//! Rules, in order:
//! 1. Display name: OAuth full name, else email local-part, else "User"
//! 2. Reserved admin id from the admin directory, else keep or generate `user_viht_id`
//! 3. Generate `client_key` when unset
//! 4. Coerce counters, collections and timestamps to valid values
//! 5. Expired premium is switched off
//! 6. `is_premium` defaults to false
//!
//! Normalizing a normalized record reports `changed == false`.

use chrono::{DateTime, Utc};
use gdf_common::{ids, time};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

use crate::catalog::{AdminDirectory, Catalog};
use crate::models::{keys, AccountIdentity, TaskProgress, UserMetadataRecord};

/// Display name used when nothing better is known
pub const FALLBACK_DISPLAY_NAME: &str = "User";

/// Normalizer output
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub record: UserMetadataRecord,
    pub changed: bool,
}

/// Normalize a raw metadata blob
pub fn normalize(
    raw: &Map<String, Value>,
    identity: &AccountIdentity,
    admins: &AdminDirectory,
    catalog: &Catalog,
    now: DateTime<Utc>,
) -> Normalized {
    let mut reader = FieldReader { raw, changed: false };

    // 1. Display name
    let display_name = match reader.non_empty_string(keys::DISPLAY_NAME) {
        Some(name) => name,
        None => fallback_display_name(identity),
    };

    // 2. Pseudonymous id; admin accounts are pinned to their reserved id
    let stored_id = reader.non_empty_string(keys::USER_VIHT_ID);
    let user_viht_id = match admins.reserved_id(identity.email.as_deref()) {
        Some(reserved) => {
            if stored_id.as_deref() != Some(reserved) {
                debug!("Pinning admin account to reserved id");
                reader.changed = true;
            }
            reserved.to_string()
        }
        None => stored_id.unwrap_or_else(ids::generate_viht_id),
    };

    // 3. Client key
    let client_key = reader
        .non_empty_string(keys::CLIENT_KEY)
        .unwrap_or_else(ids::generate_client_key);

    // 4. Counters, collections, timestamps
    let activity_points = reader.int(keys::ACTIVITY_POINTS);
    let support_tickets_created = reader.int(keys::SUPPORT_TICKETS_CREATED);
    let ai_requests_made = reader.int(keys::AI_REQUESTS_MADE);
    let ai_requests_limit = reader.int(keys::AI_REQUESTS_LIMIT);
    let last_request_reset_at = reader.timestamp(keys::LAST_REQUEST_RESET_AT);
    let terms_agreed_at = reader.timestamp(keys::TERMS_AGREED_AT);
    let awarded_achievement_points_log = reader.award_log();
    let completed_secret_achievements = reader.string_set(keys::COMPLETED_SECRET_ACHIEVEMENTS);
    let daily_task_progress = reader.task_progress(catalog);
    let mut premium_expires_at = reader.timestamp(keys::PREMIUM_EXPIRES_AT);

    // 5. Premium expiry runs against the stored flag before defaulting
    let stored_premium = raw.get(keys::IS_PREMIUM).and_then(Value::as_bool);
    let mut is_premium = stored_premium.unwrap_or(false);
    if is_premium {
        if let Some(expires) = premium_expires_at {
            if expires < now {
                debug!(expired_at = %expires, "Premium expired, demoting account");
                is_premium = false;
                premium_expires_at = None;
                reader.changed = true;
            }
        }
    }

    // 6. Default for a missing or mistyped flag
    if stored_premium.is_none() {
        reader.changed = true;
    }

    let extra: Map<String, Value> = raw
        .iter()
        .filter(|(key, _)| !keys::ALL.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let record = UserMetadataRecord {
        display_name,
        user_viht_id,
        client_key,
        is_premium,
        premium_expires_at,
        ai_requests_made,
        ai_requests_limit,
        last_request_reset_at,
        activity_points,
        awarded_achievement_points_log,
        completed_secret_achievements,
        support_tickets_created,
        daily_task_progress,
        terms_agreed_at,
        extra,
    };

    Normalized {
        record,
        changed: reader.changed,
    }
}

fn fallback_display_name(identity: &AccountIdentity) -> String {
    if let Some(name) = &identity.full_name {
        return name.clone();
    }
    identity
        .email
        .as_deref()
        .and_then(|email| email.split('@').next())
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string())
}

/// Reads owned fields, flagging every substitution
struct FieldReader<'a> {
    raw: &'a Map<String, Value>,
    changed: bool,
}

impl FieldReader<'_> {
    fn corrupt(&mut self, key: &str, value: &Value) {
        warn!(field = key, value = %value, "Corrupt metadata field, replacing with default");
        self.changed = true;
    }

    fn non_empty_string(&mut self, key: &str) -> Option<String> {
        let raw = self.raw;
        match raw.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::String(_)) | Some(Value::Null) | None => {
                self.changed = true;
                None
            }
            Some(other) => {
                self.corrupt(key, other);
                None
            }
        }
    }

    fn int(&mut self, key: &str) -> i64 {
        let raw = self.raw;
        match raw.get(key) {
            Some(value) => match value.as_i64() {
                Some(n) => n,
                None => {
                    self.corrupt(key, value);
                    0
                }
            },
            None => {
                self.changed = true;
                0
            }
        }
    }

    fn timestamp(&mut self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.raw;
        match raw.get(key) {
            Some(Value::Null) => None,
            Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(_) => {
                    self.corrupt(key, &Value::String(s.clone()));
                    None
                }
            },
            Some(value @ Value::Number(_)) => {
                // Epoch millis from older clients, rewritten as RFC 3339
                self.changed = true;
                match value.as_i64().and_then(time::from_epoch_millis) {
                    Some(ts) => Some(ts),
                    None => {
                        self.corrupt(key, value);
                        None
                    }
                }
            }
            Some(other) => {
                self.corrupt(key, other);
                None
            }
            None => {
                self.changed = true;
                None
            }
        }
    }

    fn award_log(&mut self) -> BTreeMap<String, bool> {
        let key = keys::AWARDED_ACHIEVEMENT_POINTS_LOG;
        let raw = self.raw;
        match raw.get(key) {
            Some(Value::Object(map)) => {
                // Presence of a key is the award guard; values are normalized to true
                if map.values().any(|v| v != &Value::Bool(true)) {
                    self.changed = true;
                }
                map.keys().map(|id| (id.clone(), true)).collect()
            }
            Some(other) => {
                self.corrupt(key, other);
                BTreeMap::new()
            }
            None => {
                self.changed = true;
                BTreeMap::new()
            }
        }
    }

    fn string_set(&mut self, key: &str) -> BTreeSet<String> {
        let raw = self.raw;
        match raw.get(key) {
            Some(Value::Array(items)) => {
                let set: BTreeSet<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                if set.len() != items.len() {
                    self.changed = true;
                }
                set
            }
            Some(other) => {
                self.corrupt(key, other);
                BTreeSet::new()
            }
            None => {
                self.changed = true;
                BTreeSet::new()
            }
        }
    }

    /// Parse task rows, dropping corrupt, duplicate and unknown entries
    fn task_progress(&mut self, catalog: &Catalog) -> Vec<TaskProgress> {
        let key = keys::DAILY_TASK_PROGRESS;
        let raw = self.raw;
        let items = match raw.get(key) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                self.corrupt(key, other);
                return Vec::new();
            }
            None => {
                self.changed = true;
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(items.len());
        for item in items {
            let task: TaskProgress = match serde_json::from_value(item.clone()) {
                Ok(task) => task,
                Err(e) => {
                    warn!(error = %e, "Dropping unreadable daily task entry");
                    self.changed = true;
                    continue;
                }
            };

            if !catalog.knows_task(&task.task_id) {
                debug!(task_id = %task.task_id, "Pruning progress for retired task");
                self.changed = true;
                continue;
            }

            if !seen.insert(task.task_id.clone()) {
                self.changed = true;
                continue;
            }

            tasks.push(task);
        }
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use gdf_common::config::AdminEntry;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    fn identity(email: &str) -> AccountIdentity {
        AccountIdentity {
            email: Some(email.to_string()),
            full_name: None,
        }
    }

    fn run(raw: Value, identity: &AccountIdentity) -> Normalized {
        let admins = AdminDirectory::new(&[AdminEntry {
            email: "boss@gdf.dev".to_string(),
            viht_id: "VIHT-ADMIN-0001".to_string(),
        }]);
        normalize(
            raw.as_object().unwrap(),
            identity,
            &admins,
            &Catalog::standard(),
            now(),
        )
    }

    #[test]
    fn test_empty_record_is_fully_defaulted() {
        let out = run(json!({}), &identity("ann.lee@example.com"));

        assert!(out.changed);
        let r = &out.record;
        assert_eq!(r.display_name, "ann.lee");
        assert!(r.user_viht_id.starts_with(ids::VIHT_ID_PREFIX));
        assert!(!r.client_key.is_empty());
        assert!(!r.is_premium);
        assert_eq!(r.premium_expires_at, None);
        assert_eq!(r.activity_points, 0);
        assert_eq!(r.support_tickets_created, 0);
        assert!(r.awarded_achievement_points_log.is_empty());
        assert!(r.completed_secret_achievements.is_empty());
        assert!(r.daily_task_progress.is_empty());
        assert_eq!(r.terms_agreed_at, None);
    }

    #[test]
    fn test_display_name_fallback_chain() {
        let with_name = AccountIdentity {
            email: Some("x@example.com".to_string()),
            full_name: Some("Xavier".to_string()),
        };
        assert_eq!(run(json!({}), &with_name).record.display_name, "Xavier");
        assert_eq!(
            run(json!({}), &AccountIdentity::default()).record.display_name,
            FALLBACK_DISPLAY_NAME
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let first = run(json!({}), &identity("ann@example.com"));
        let raw = serde_json::to_value(&first.record).unwrap();

        let second = run(raw, &identity("ann@example.com"));

        assert!(!second.changed);
        assert_eq!(second.record, first.record);
    }

    #[test]
    fn test_admin_email_forces_reserved_id() {
        let out = run(json!({"user_viht_id": "VIHT-random"}), &identity("Boss@gdf.dev"));
        assert_eq!(out.record.user_viht_id, "VIHT-ADMIN-0001");
        assert!(out.changed);
    }

    #[test]
    fn test_existing_id_is_kept() {
        let out = run(json!({"user_viht_id": "VIHT-keepme"}), &identity("a@b.c"));
        assert_eq!(out.record.user_viht_id, "VIHT-keepme");
    }

    #[test]
    fn test_expired_premium_is_demoted() {
        let expired = (now() - Duration::days(1)).to_rfc3339();
        let out = run(
            json!({"is_premium": true, "premium_expires_at": expired}),
            &identity("a@b.c"),
        );

        assert!(out.changed);
        assert!(!out.record.is_premium);
        assert_eq!(out.record.premium_expires_at, None);
    }

    #[test]
    fn test_future_premium_is_kept() {
        let expires = now() + Duration::days(30);
        let out = run(
            json!({"is_premium": true, "premium_expires_at": expires.to_rfc3339()}),
            &identity("a@b.c"),
        );

        assert!(out.record.is_premium);
        assert_eq!(out.record.premium_expires_at, Some(expires));
    }

    #[test]
    fn test_wrong_types_are_coerced() {
        let out = run(
            json!({
                "activity_points": "lots",
                "support_tickets_created": null,
                "completed_secret_achievements": "konami",
                "awarded_achievement_points_log": [1, 2],
                "terms_agreed_at": 17,
                "daily_task_progress": {"task_id": "daily_login"}
            }),
            &identity("a@b.c"),
        );

        let r = &out.record;
        assert!(out.changed);
        assert_eq!(r.activity_points, 0);
        assert_eq!(r.support_tickets_created, 0);
        assert!(r.completed_secret_achievements.is_empty());
        assert!(r.awarded_achievement_points_log.is_empty());
        assert!(r.daily_task_progress.is_empty());
        // Numeric timestamps are read as epoch millis
        assert_eq!(r.terms_agreed_at, time::from_epoch_millis(17));
    }

    #[test]
    fn test_unknown_and_corrupt_tasks_are_pruned() {
        let out = run(
            json!({
                "daily_task_progress": [
                    {"task_id": "daily_login", "current_value": 1, "completed_today": true,
                     "claimed_today": false, "last_progress_date": "2026-06-15"},
                    {"task_id": "retired_task", "current_value": 0, "completed_today": false,
                     "claimed_today": false, "last_progress_date": "2026-06-15"},
                    {"task_id": "ai_explorer", "current_value": "three"},
                    {"task_id": "daily_login", "current_value": 0, "completed_today": false,
                     "claimed_today": false, "last_progress_date": "2026-06-15"}
                ]
            }),
            &identity("a@b.c"),
        );

        let tasks = &out.record.daily_task_progress;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_id, "daily_login");
        assert!(tasks[0].completed_today);
    }

    #[test]
    fn test_foreign_keys_pass_through() {
        let out = run(json!({"avatar_url": "a.png", "full_name": "Ann"}), &identity("a@b.c"));
        assert_eq!(out.record.extra.get("avatar_url"), Some(&json!("a.png")));
        assert_eq!(out.record.extra.get("full_name"), Some(&json!("Ann")));
    }
}
