pub mod badge;
pub mod due_queue;
pub mod progress;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod streak;

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Timestamps are persisted as unix milliseconds.
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

pub fn to_rfc3339(ms: i64) -> String {
    from_millis(ms).to_rfc3339()
}

/// Calendar day for streak/daily-task purposes: UTC shifted by the
/// configured day-boundary offset.
pub fn activity_date(now: DateTime<Utc>, utc_offset_minutes: i64) -> NaiveDate {
    (now + Duration::minutes(utc_offset_minutes)).date_naive()
}

/// SQLite reports constraint races as unique violations; callers turn
/// these into domain conflicts.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
