//! Learning session lifecycle. The single-active-session invariant is
//! carried by the partial unique index on (userId) WHERE endedAt IS NULL:
//! concurrent starts race on the insert and exactly one wins.

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

use crate::error::ServiceError;
use crate::services::badge::{self, UserBadge};
use crate::services::streak::{self, TaskType};
use crate::services::{from_millis, is_unique_violation, to_millis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Learn,
    Review,
    Mixed,
}

impl SessionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "learn" => Some(Self::Learn),
            "review" => Some(Self::Review),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learn => "learn",
            Self::Review => "review",
            Self::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSession {
    pub id: String,
    pub user_id: String,
    pub session_type: SessionType,
    pub goal_id: Option<String>,
    pub scenario_id: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub xp_earned: i64,
}

fn row_to_session(row: &SqliteRow) -> Result<LearningSession, sqlx::Error> {
    let raw_type: String = row.try_get("sessionType")?;
    Ok(LearningSession {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        session_type: SessionType::parse(&raw_type).unwrap_or(SessionType::Mixed),
        goal_id: row.try_get("goalId")?,
        scenario_id: row.try_get("scenarioId")?,
        started_at: from_millis(row.try_get("startedAt")?).to_rfc3339(),
        ended_at: row
            .try_get::<Option<i64>, _>("endedAt")?
            .map(|ms| from_millis(ms).to_rfc3339()),
        xp_earned: row.try_get("xpEarned")?,
    })
}

const SESSION_COLUMNS: &str = r#""id", "userId", "sessionType", "goalId", "scenarioId", "startedAt", "endedAt", "xpEarned""#;

/// Starts a new session for the user. Fails with `SessionAlreadyActive`
/// when one is still open; the partial unique index is the arbiter.
pub async fn start_session(
    pool: &SqlitePool,
    user_id: &str,
    session_type: SessionType,
    goal_id: Option<String>,
    scenario_id: Option<String>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<LearningSession, ServiceError> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let now_ms = to_millis(now);

    let result = sqlx::query(
        r#"INSERT INTO "learning_sessions"
           ("id", "userId", "sessionType", "goalId", "scenarioId", "startedAt", "endedAt", "xpEarned")
           VALUES (?, ?, ?, ?, ?, ?, NULL, 0)"#,
    )
    .bind(&session_id)
    .bind(user_id)
    .bind(session_type.as_str())
    .bind(&goal_id)
    .bind(&scenario_id)
    .bind(now_ms)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => return Err(ServiceError::SessionAlreadyActive),
        Err(err) => return Err(err.into()),
    }

    tracing::info!(user = %user_id, session = %session_id, kind = session_type.as_str(), "session started");

    Ok(LearningSession {
        id: session_id,
        user_id: user_id.to_string(),
        session_type,
        goal_id,
        scenario_id,
        started_at: from_millis(now_ms).to_rfc3339(),
        ended_at: None,
        xp_earned: 0,
    })
}

/// Ends a session, persisting the caller's XP total and evaluating
/// streak/tasks/badges in the same transaction.
///
/// A repeat call with the xp the session already ended with returns the
/// session unchanged; a repeat with a different xp is a conflict.
pub async fn end_session(
    pool: &SqlitePool,
    user_id: &str,
    session_id: &str,
    xp_earned: i64,
    now: chrono::DateTime<chrono::Utc>,
    streak_utc_offset_minutes: i64,
) -> Result<(LearningSession, Vec<UserBadge>), ServiceError> {
    if xp_earned < 0 {
        return Err(ServiceError::validation("xpEarned must be non-negative"));
    }

    let mut tx = pool.begin().await?;

    let query = format!(
        r#"SELECT {SESSION_COLUMNS} FROM "learning_sessions" WHERE "id" = ? AND "userId" = ?"#
    );
    let row = sqlx::query(&query)
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(row) = row else {
        return Err(ServiceError::not_found(format!(
            "session not found: {session_id}"
        )));
    };

    let existing = row_to_session(&row)?;
    if existing.ended_at.is_some() {
        if existing.xp_earned == xp_earned {
            return Ok((existing, Vec::new()));
        }
        return Err(ServiceError::SessionAlreadyEnded);
    }

    // The guard on endedAt makes the close race-proof: only one writer can
    // flip an open session to ended.
    let now_ms = to_millis(now);
    let updated = sqlx::query(
        r#"UPDATE "learning_sessions" SET "endedAt" = ?, "xpEarned" = ?
           WHERE "id" = ? AND "endedAt" IS NULL"#,
    )
    .bind(now_ms)
    .bind(xp_earned)
    .bind(session_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ServiceError::SessionAlreadyEnded);
    }

    // A completed session counts as activity for the day.
    let date = crate::services::activity_date(now, streak_utc_offset_minutes);
    streak::record_activity(&mut *tx, user_id, date).await?;
    streak::update_daily_task(&mut *tx, user_id, date, TaskType::SessionCompleted, 1).await?;

    let stats = badge::metrics_snapshot(&mut *tx, user_id).await?;
    let new_badges = badge::evaluate_badges(&mut *tx, user_id, &stats, now_ms).await?;

    tx.commit().await?;

    tracing::info!(user = %user_id, session = %session_id, xp = xp_earned, "session ended");

    let mut ended = existing;
    ended.ended_at = Some(from_millis(now_ms).to_rfc3339());
    ended.xp_earned = xp_earned;
    Ok((ended, new_badges))
}

pub async fn get_active_session(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<LearningSession>, ServiceError> {
    let query = format!(
        r#"SELECT {SESSION_COLUMNS} FROM "learning_sessions"
           WHERE "userId" = ? AND "endedAt" IS NULL LIMIT 1"#
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(match row {
        Some(row) => Some(row_to_session(&row)?),
        None => None,
    })
}

/// Records vocabulary served to a session so the due-queue selector will
/// not serve it again while the session is open.
pub async fn add_session_items(
    conn: &mut SqliteConnection,
    session_id: &str,
    vocabulary_ids: &[String],
) -> Result<(), ServiceError> {
    for vocabulary_id in vocabulary_ids {
        sqlx::query(
            r#"INSERT OR IGNORE INTO "session_items" ("sessionId", "vocabularyId") VALUES (?, ?)"#,
        )
        .bind(session_id)
        .bind(vocabulary_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Running XP accumulation while the session is open; the final total is
/// fixed by `end_session`.
pub async fn add_xp_to_active_session(
    conn: &mut SqliteConnection,
    user_id: &str,
    xp: i64,
) -> Result<(), ServiceError> {
    sqlx::query(
        r#"UPDATE "learning_sessions" SET "xpEarned" = "xpEarned" + ?
           WHERE "userId" = ? AND "endedAt" IS NULL"#,
    )
    .bind(xp)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
