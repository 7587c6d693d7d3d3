//! Badge awarder. Criteria are thresholds on user metrics; awards are
//! at-most-once, enforced by the unique (user, badge) index rather than
//! by application-level locking. Evaluation runs inside the transaction
//! of the event that moved the metric.

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection};

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeConditionType {
    WordsLearned,
    Streak,
    TotalXp,
    TotalSessions,
}

impl BadgeConditionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "words_learned" => Some(Self::WordsLearned),
            "streak" => Some(Self::Streak),
            "total_xp" => Some(Self::TotalXp),
            "total_sessions" => Some(Self::TotalSessions),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WordsLearned => "words_learned",
            Self::Streak => "streak",
            Self::TotalXp => "total_xp",
            Self::TotalSessions => "total_sessions",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub condition_type: BadgeConditionType,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBadge {
    pub id: String,
    pub badge_id: String,
    pub name: String,
    pub description: String,
    pub unlocked_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeStatus {
    #[serde(flatten)]
    pub badge: BadgeDefinition,
    pub unlocked: bool,
    pub unlocked_at: Option<String>,
    pub progress_percent: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub words_learned: i64,
    pub current_streak: i64,
    pub total_xp: i64,
    pub total_sessions: i64,
}

/// Current metrics for one user, read with the caller's connection so a
/// snapshot taken mid-transaction sees that transaction's writes.
pub async fn metrics_snapshot(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<MetricsSnapshot, ServiceError> {
    let words_learned: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "vocabulary_progress" WHERE "userId" = ? AND "reps" > 0"#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let current_streak: i64 = sqlx::query_scalar(
        r#"SELECT "currentStreak" FROM "user_streaks" WHERE "userId" = ?"#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    .unwrap_or(0);

    let total_xp: i64 =
        sqlx::query_scalar(r#"SELECT "totalXp" FROM "user_stats" WHERE "userId" = ?"#)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or(0);

    let total_sessions: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "learning_sessions" WHERE "userId" = ? AND "endedAt" IS NOT NULL"#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(MetricsSnapshot {
        words_learned,
        current_streak,
        total_xp,
        total_sessions,
    })
}

fn metric_value(condition: BadgeConditionType, stats: &MetricsSnapshot) -> f64 {
    match condition {
        BadgeConditionType::WordsLearned => stats.words_learned as f64,
        BadgeConditionType::Streak => stats.current_streak as f64,
        BadgeConditionType::TotalXp => stats.total_xp as f64,
        BadgeConditionType::TotalSessions => stats.total_sessions as f64,
    }
}

pub async fn all_definitions(
    conn: &mut SqliteConnection,
) -> Result<Vec<BadgeDefinition>, ServiceError> {
    let rows = sqlx::query(
        r#"SELECT "id", "name", "description", "conditionType", "threshold"
           FROM "badge_definitions" ORDER BY "conditionType", "threshold""#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut definitions = Vec::with_capacity(rows.len());
    for row in rows {
        let raw_type: String = row.try_get("conditionType")?;
        let Some(condition_type) = BadgeConditionType::parse(&raw_type) else {
            tracing::warn!(condition = %raw_type, "skipping badge with unknown condition type");
            continue;
        };
        definitions.push(BadgeDefinition {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            condition_type,
            threshold: row.try_get("threshold")?,
        });
    }
    Ok(definitions)
}

/// Checks every badge the user has not unlocked against the given metrics
/// and awards the ones whose criterion is met. Returns only the badges
/// this call actually inserted: a concurrent duplicate loses on the
/// unique index and reports nothing new.
pub async fn evaluate_badges(
    conn: &mut SqliteConnection,
    user_id: &str,
    stats: &MetricsSnapshot,
    now_ms: i64,
) -> Result<Vec<UserBadge>, ServiceError> {
    let definitions = all_definitions(conn).await?;
    let mut newly_unlocked = Vec::new();

    for badge in definitions {
        if metric_value(badge.condition_type, stats) < badge.threshold {
            continue;
        }

        let user_badge_id = uuid::Uuid::new_v4().to_string();
        let affected = sqlx::query(
            r#"INSERT OR IGNORE INTO "user_badges" ("id", "userId", "badgeId", "unlockedAt")
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(&user_badge_id)
        .bind(user_id)
        .bind(&badge.id)
        .bind(now_ms)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if affected == 1 {
            tracing::info!(user = %user_id, badge = %badge.id, "badge unlocked");
            newly_unlocked.push(UserBadge {
                id: user_badge_id,
                badge_id: badge.id,
                name: badge.name,
                description: badge.description,
                unlocked_at: crate::services::to_rfc3339(now_ms),
            });
        }
    }

    Ok(newly_unlocked)
}

/// Full catalog with per-badge unlock status and progress percentage.
pub async fn badges_with_status(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Vec<BadgeStatus>, ServiceError> {
    let definitions = all_definitions(conn).await?;
    let stats = metrics_snapshot(conn, user_id).await?;

    let rows = sqlx::query(
        r#"SELECT "badgeId", "unlockedAt" FROM "user_badges" WHERE "userId" = ?"#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let unlocked: std::collections::HashMap<String, i64> = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.try_get::<String, _>("badgeId").ok()?;
            let at = row.try_get::<i64, _>("unlockedAt").ok()?;
            Some((id, at))
        })
        .collect();

    Ok(definitions
        .into_iter()
        .map(|badge| {
            let unlocked_at = unlocked.get(&badge.id).copied();
            let progress_percent = if unlocked_at.is_some() {
                100
            } else if badge.threshold <= 0.0 {
                100
            } else {
                ((metric_value(badge.condition_type, &stats) / badge.threshold * 100.0)
                    .min(100.0)
                    .round()) as i64
            };

            BadgeStatus {
                badge,
                unlocked: unlocked_at.is_some(),
                unlocked_at: unlocked_at.map(crate::services::to_rfc3339),
                progress_percent,
            }
        })
        .collect())
}
