//! Timestamp utilities

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Milliseconds in one day
pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Calendar date (UTC) used for daily bookkeeping
pub fn today(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

/// Epoch milliseconds for a timestamp
pub fn to_epoch_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Timestamp from epoch milliseconds, `None` if out of range
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Milliseconds elapsed from `since` to `now` (negative if `since` is in the future)
pub fn elapsed_millis(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(since).num_milliseconds()
}
