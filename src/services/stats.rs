//! Read-only aggregates over the event log and progress store.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqliteConnection};

use crate::error::ServiceError;
use crate::services::streak::{self, DailyTask, UserStreak};
use crate::services::to_millis;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayStats {
    pub date: NaiveDate,
    pub reviews_today: i64,
    pub new_words_today: i64,
    pub xp_today: i64,
    pub streak: UserStreak,
    pub tasks: Vec<DailyTask>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCounts {
    pub new: i64,
    pub learning: i64,
    pub review: i64,
    pub relearning: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_reviews: i64,
    pub words_tracked: i64,
    pub words_learned: i64,
    pub state_counts: StateCounts,
    pub total_xp: i64,
    pub total_sessions: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub badges_unlocked: i64,
}

fn day_window(now: DateTime<Utc>, utc_offset_minutes: i64) -> (NaiveDate, i64, i64) {
    let date = crate::services::activity_date(now, utc_offset_minutes);
    let start = date.and_time(NaiveTime::MIN).and_utc() - Duration::minutes(utc_offset_minutes);
    (date, to_millis(start), to_millis(start + Duration::days(1)))
}

/// Today's activity: review and new-word counts, XP earned from reviews,
/// the streak, and the day's tasks (created lazily if missing).
pub async fn today_stats(
    conn: &mut SqliteConnection,
    user_id: &str,
    now: DateTime<Utc>,
    utc_offset_minutes: i64,
) -> Result<TodayStats, ServiceError> {
    let (date, start_ms, end_ms) = day_window(now, utc_offset_minutes);

    let row = sqlx::query(
        r#"SELECT COUNT(*) AS "reviews", COALESCE(SUM("xpEarned"), 0) AS "xp"
           FROM "review_events"
           WHERE "userId" = ? AND "reviewedAt" >= ? AND "reviewedAt" < ?"#,
    )
    .bind(user_id)
    .bind(start_ms)
    .bind(end_ms)
    .fetch_one(&mut *conn)
    .await?;
    let reviews_today: i64 = row.try_get("reviews")?;
    let xp_today: i64 = row.try_get("xp")?;

    let new_words_today: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "vocabulary_progress"
           WHERE "userId" = ? AND "createdAt" >= ? AND "createdAt" < ?"#,
    )
    .bind(user_id)
    .bind(start_ms)
    .bind(end_ms)
    .fetch_one(&mut *conn)
    .await?;

    let streak = streak::get_streak(&mut *conn, user_id).await?;
    let tasks = streak::ensure_daily_tasks(&mut *conn, user_id, date).await?;

    Ok(TodayStats {
        date,
        reviews_today,
        new_words_today,
        xp_today,
        streak,
        tasks,
    })
}

/// Lifetime aggregates for the user.
pub async fn user_stats(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<UserStats, ServiceError> {
    let total_reviews: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "review_events" WHERE "userId" = ?"#)
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;

    let state_rows = sqlx::query(
        r#"SELECT "state", COUNT(*) AS "n" FROM "vocabulary_progress"
           WHERE "userId" = ? GROUP BY "state""#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut counts = StateCounts {
        new: 0,
        learning: 0,
        review: 0,
        relearning: 0,
    };
    let mut words_tracked = 0;
    for row in &state_rows {
        let state: String = row.try_get("state")?;
        let n: i64 = row.try_get("n")?;
        words_tracked += n;
        match state.as_str() {
            "LEARNING" => counts.learning = n,
            "REVIEW" => counts.review = n,
            "RELEARNING" => counts.relearning = n,
            _ => counts.new = n,
        }
    }

    let words_learned: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "vocabulary_progress" WHERE "userId" = ? AND "reps" > 0"#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let total_xp: i64 = sqlx::query_scalar(
        r#"SELECT COALESCE(MAX("totalXp"), 0) FROM "user_stats" WHERE "userId" = ?"#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let total_sessions: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "learning_sessions" WHERE "userId" = ? AND "endedAt" IS NOT NULL"#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let badges_unlocked: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user_badges" WHERE "userId" = ?"#)
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;

    let streak = streak::get_streak(&mut *conn, user_id).await?;

    Ok(UserStats {
        total_reviews,
        words_tracked,
        words_learned,
        state_counts: counts,
        total_xp,
        total_sessions,
        current_streak: streak.current_streak,
        longest_streak: streak.longest_streak,
        badges_unlocked,
    })
}
