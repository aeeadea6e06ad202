//! Entitlement recalculator
//!
//! Derives the AI quota and the daily task rollover from a normalized record
//! and the wall clock. Must run after normalization so a premium that just
//! expired is demoted to the standard quota in the same pass.

use chrono::{DateTime, Utc};
use gdf_common::config::QuotaConfig;
use gdf_common::time::{self, MILLIS_PER_DAY};
use tracing::debug;

use crate::catalog::Catalog;
use crate::models::{TaskProgress, UserMetadataRecord};

/// Quota limit for the record's current tier
pub fn tier_limit(record: &UserMetadataRecord, quota: &QuotaConfig) -> i64 {
    if record.is_premium {
        quota.premium_limit
    } else {
        quota.standard_limit
    }
}

/// Recalculate entitlements in place; returns whether anything changed
pub fn recalculate(
    record: &mut UserMetadataRecord,
    now: DateTime<Utc>,
    quota: &QuotaConfig,
    catalog: &Catalog,
) -> bool {
    let mut changed = false;

    let limit = tier_limit(record, quota);
    if record.ai_requests_limit != limit {
        debug!(from = record.ai_requests_limit, to = limit, "Adjusting AI request limit");
        record.ai_requests_limit = limit;
        changed = true;
    }

    // Reset window measured in elapsed milliseconds, not calendar days
    let interval_ms = quota.reset_interval_days.saturating_mul(MILLIS_PER_DAY);
    let window_elapsed = match record.last_request_reset_at {
        None => true,
        Some(last) => time::elapsed_millis(last, now) >= interval_ms,
    };
    if window_elapsed {
        debug!(made = record.ai_requests_made, "Resetting AI request window");
        record.ai_requests_made = 0;
        record.last_request_reset_at = Some(now);
        changed = true;
    }

    let today = time::today(now);
    let now_ms = time::to_epoch_millis(now);

    // Daily rollover; tasks in an active claim cooldown wait for regeneration
    for task in record.daily_task_progress.iter_mut() {
        if task.last_progress_date != today && !task.in_active_cooldown(now_ms) {
            task.reset_progress(today);
            changed = true;
        }
    }

    for definition in &catalog.tasks {
        if record.task(definition.id).is_none() {
            record
                .daily_task_progress
                .push(TaskProgress::fresh(definition.id, today));
            changed = true;
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AdminDirectory;
    use crate::engine::normalizer::normalize;
    use crate::models::AccountIdentity;
    use chrono::{Duration, NaiveDate, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    fn record(raw: serde_json::Value) -> UserMetadataRecord {
        normalize(
            raw.as_object().unwrap(),
            &AccountIdentity::default(),
            &AdminDirectory::default(),
            &Catalog::standard(),
            now(),
        )
        .record
    }

    #[test]
    fn test_fresh_record_gets_quota_and_tasks() {
        let mut r = record(json!({}));
        let quota = QuotaConfig::default();

        assert!(recalculate(&mut r, now(), &quota, &Catalog::standard()));
        assert_eq!(r.ai_requests_limit, quota.standard_limit);
        assert_eq!(r.ai_requests_made, 0);
        assert_eq!(r.last_request_reset_at, Some(now()));
        assert_eq!(r.daily_task_progress.len(), Catalog::standard().tasks.len());
        assert!(r
            .daily_task_progress
            .iter()
            .all(|t| t.last_progress_date == time::today(now()) && t.current_value == 0));

        // Second pass is a no-op
        assert!(!recalculate(&mut r, now(), &quota, &Catalog::standard()));
    }

    #[test]
    fn test_premium_limit_and_demotion() {
        let quota = QuotaConfig::default();
        let expires = now() + Duration::days(30);
        let mut r = record(json!({"is_premium": true, "premium_expires_at": expires.to_rfc3339()}));
        recalculate(&mut r, now(), &quota, &Catalog::standard());
        assert_eq!(r.ai_requests_limit, quota.premium_limit);

        // Same stored record read after expiry
        let later = expires + Duration::seconds(1);
        let mut expired = normalize(
            &r.to_patch(),
            &AccountIdentity::default(),
            &AdminDirectory::default(),
            &Catalog::standard(),
            later,
        )
        .record;
        assert!(recalculate(&mut expired, later, &quota, &Catalog::standard()));
        assert!(!expired.is_premium);
        assert_eq!(expired.premium_expires_at, None);
        assert_eq!(expired.ai_requests_limit, quota.standard_limit);
    }

    #[test]
    fn test_reset_window_boundary() {
        let quota = QuotaConfig::default();
        let interval = Duration::days(quota.reset_interval_days);

        let over = now() - interval - Duration::milliseconds(1);
        let mut r = record(json!({"ai_requests_made": 7, "last_request_reset_at": over.to_rfc3339()}));
        recalculate(&mut r, now(), &quota, &Catalog::standard());
        assert_eq!(r.ai_requests_made, 0);
        assert_eq!(r.last_request_reset_at, Some(now()));

        let short = now() - interval + Duration::milliseconds(1);
        let mut r = record(json!({"ai_requests_made": 7, "last_request_reset_at": short.to_rfc3339()}));
        recalculate(&mut r, now(), &quota, &Catalog::standard());
        assert_eq!(r.ai_requests_made, 7);
        assert_eq!(r.last_request_reset_at, Some(short));
    }

    #[test]
    fn test_daily_rollover_resets_yesterdays_progress() {
        let yesterday = NaiveDate::from_ymd_opt(2026, 6, 14).unwrap();
        let mut r = record(json!({}));
        let mut task = TaskProgress::fresh("ai_explorer", yesterday);
        task.current_value = 3;
        task.completed_today = true;
        task.claimed_today = false;
        r.daily_task_progress.push(task);

        recalculate(&mut r, now(), &QuotaConfig::default(), &Catalog::standard());

        let task = r.task("ai_explorer").unwrap();
        assert_eq!(task.current_value, 0);
        assert!(!task.completed_today);
        assert!(!task.claimed_today);
        assert_eq!(task.last_progress_date, time::today(now()));
    }

    #[test]
    fn test_rollover_skips_active_cooldown() {
        let yesterday = NaiveDate::from_ymd_opt(2026, 6, 14).unwrap();
        let mut r = record(json!({}));
        let mut task = TaskProgress::fresh("daily_login", yesterday);
        task.current_value = 1;
        task.completed_today = true;
        task.claimed_today = true;
        task.claimed_at_timestamp = Some(time::to_epoch_millis(now() - Duration::hours(2)));
        r.daily_task_progress.push(task.clone());

        recalculate(&mut r, now(), &QuotaConfig::default(), &Catalog::standard());

        assert_eq!(r.task("daily_login"), Some(&task));
    }
}
