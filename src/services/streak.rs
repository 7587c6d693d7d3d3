//! Streak and daily-task engine.
//!
//! `record_activity` mutates the per-user streak row at most once per
//! calendar day. Daily task rows are created lazily on the first
//! qualifying event of the day, and their reward is claimable exactly
//! once. All writers take a connection so the caller can keep them inside
//! the transaction of the triggering event.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::ServiceError;
use crate::services::progress::credit_user_xp;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStreak {
    pub user_id: String,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_active_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    WordsReviewed,
    NewWords,
    SessionCompleted,
}

impl TaskType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "words_reviewed" => Some(Self::WordsReviewed),
            "new_words" => Some(Self::NewWords),
            "session_completed" => Some(Self::SessionCompleted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WordsReviewed => "words_reviewed",
            Self::NewWords => "new_words",
            Self::SessionCompleted => "session_completed",
        }
    }
}

/// (type, target, reward XP) for the tasks spawned each day.
pub const DEFAULT_DAILY_TASKS: [(TaskType, i64, i64); 3] = [
    (TaskType::WordsReviewed, 10, 20),
    (TaskType::NewWords, 5, 15),
    (TaskType::SessionCompleted, 1, 10),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTask {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub task_type: TaskType,
    pub target: i64,
    pub progress: i64,
    pub reward_xp: i64,
    pub reward_claimed: bool,
}

/// Applies one day of activity to the user's streak. Same-day repeats are
/// no-ops; a consecutive day extends the streak; any gap resets it to 1.
pub async fn record_activity(
    conn: &mut SqliteConnection,
    user_id: &str,
    date: NaiveDate,
) -> Result<UserStreak, ServiceError> {
    let row = sqlx::query(
        r#"SELECT "currentStreak", "longestStreak", "lastActiveDate"
           FROM "user_streaks" WHERE "userId" = ?"#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let (current, longest, last_active) = match &row {
        Some(row) => (
            row.try_get::<i64, _>("currentStreak")?,
            row.try_get::<i64, _>("longestStreak")?,
            row.try_get::<Option<String>, _>("lastActiveDate")?
                .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        ),
        None => (0, 0, None),
    };

    let (next_current, next_longest) = match last_active {
        Some(last) if last == date => {
            return Ok(UserStreak {
                user_id: user_id.to_string(),
                current_streak: current,
                longest_streak: longest,
                last_active_date: Some(last),
            });
        }
        Some(last) if date.signed_duration_since(last).num_days() == 1 => {
            let c = current + 1;
            (c, longest.max(c))
        }
        _ => (1, longest.max(1)),
    };

    sqlx::query(
        r#"INSERT INTO "user_streaks" ("userId", "currentStreak", "longestStreak", "lastActiveDate")
           VALUES (?, ?, ?, ?)
           ON CONFLICT ("userId") DO UPDATE SET
             "currentStreak" = excluded."currentStreak",
             "longestStreak" = excluded."longestStreak",
             "lastActiveDate" = excluded."lastActiveDate""#,
    )
    .bind(user_id)
    .bind(next_current)
    .bind(next_longest)
    .bind(date.format("%Y-%m-%d").to_string())
    .execute(&mut *conn)
    .await?;

    Ok(UserStreak {
        user_id: user_id.to_string(),
        current_streak: next_current,
        longest_streak: next_longest,
        last_active_date: Some(date),
    })
}

pub async fn get_streak(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<UserStreak, ServiceError> {
    let row = sqlx::query(
        r#"SELECT "currentStreak", "longestStreak", "lastActiveDate"
           FROM "user_streaks" WHERE "userId" = ?"#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(match row {
        Some(row) => UserStreak {
            user_id: user_id.to_string(),
            current_streak: row.try_get("currentStreak")?,
            longest_streak: row.try_get("longestStreak")?,
            last_active_date: row
                .try_get::<Option<String>, _>("lastActiveDate")?
                .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        },
        None => UserStreak {
            user_id: user_id.to_string(),
            current_streak: 0,
            longest_streak: 0,
            last_active_date: None,
        },
    })
}

/// Creates the day's task rows if they do not exist yet and returns all of
/// them. The unique (user, date, type) index makes concurrent creation
/// collapse to a single row.
pub async fn ensure_daily_tasks(
    conn: &mut SqliteConnection,
    user_id: &str,
    date: NaiveDate,
) -> Result<Vec<DailyTask>, ServiceError> {
    let date_str = date.format("%Y-%m-%d").to_string();

    for (task_type, target, reward_xp) in DEFAULT_DAILY_TASKS {
        sqlx::query(
            r#"INSERT OR IGNORE INTO "daily_tasks"
               ("id", "userId", "date", "taskType", "target", "progress", "rewardXp", "rewardClaimed")
               VALUES (?, ?, ?, ?, ?, 0, ?, 0)"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&date_str)
        .bind(task_type.as_str())
        .bind(target)
        .bind(reward_xp)
        .execute(&mut *conn)
        .await?;
    }

    list_daily_tasks(conn, user_id, date).await
}

pub async fn list_daily_tasks(
    conn: &mut SqliteConnection,
    user_id: &str,
    date: NaiveDate,
) -> Result<Vec<DailyTask>, ServiceError> {
    let rows = sqlx::query(
        r#"SELECT "id", "taskType", "target", "progress", "rewardXp", "rewardClaimed"
           FROM "daily_tasks" WHERE "userId" = ? AND "date" = ? ORDER BY "taskType""#,
    )
    .bind(user_id)
    .bind(date.format("%Y-%m-%d").to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut tasks = Vec::with_capacity(rows.len());
    for row in rows {
        let raw_type: String = row.try_get("taskType")?;
        let Some(task_type) = TaskType::parse(&raw_type) else {
            continue;
        };
        tasks.push(DailyTask {
            id: row.try_get("id")?,
            user_id: user_id.to_string(),
            date,
            task_type,
            target: row.try_get("target")?,
            progress: row.try_get("progress")?,
            reward_xp: row.try_get("rewardXp")?,
            reward_claimed: row.try_get::<i64, _>("rewardClaimed")? != 0,
        });
    }
    Ok(tasks)
}

/// Advances one task's progress, clamped to its target. Never claims the
/// reward.
pub async fn update_daily_task(
    conn: &mut SqliteConnection,
    user_id: &str,
    date: NaiveDate,
    task_type: TaskType,
    delta: i64,
) -> Result<(), ServiceError> {
    if delta <= 0 {
        return Ok(());
    }

    ensure_daily_tasks(conn, user_id, date).await?;

    sqlx::query(
        r#"UPDATE "daily_tasks"
           SET "progress" = MIN("target", "progress" + ?)
           WHERE "userId" = ? AND "date" = ? AND "taskType" = ?"#,
    )
    .bind(delta)
    .bind(user_id)
    .bind(date.format("%Y-%m-%d").to_string())
    .bind(task_type.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Flips `rewardClaimed` and credits the XP, atomically and exactly once.
pub async fn claim_task_reward(
    pool: &SqlitePool,
    user_id: &str,
    task_id: &str,
) -> Result<i64, ServiceError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"SELECT "target", "progress", "rewardXp", "rewardClaimed"
           FROM "daily_tasks" WHERE "id" = ? AND "userId" = ?"#,
    )
    .bind(task_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        return Err(ServiceError::not_found(format!("task not found: {task_id}")));
    };

    let claimed = row.try_get::<i64, _>("rewardClaimed")? != 0;
    if claimed {
        return Err(ServiceError::AlreadyClaimed);
    }

    let target: i64 = row.try_get("target")?;
    let progress: i64 = row.try_get("progress")?;
    if progress < target {
        return Err(ServiceError::TaskIncomplete);
    }

    let reward_xp: i64 = row.try_get("rewardXp")?;

    // The claimed guard repeats in the WHERE clause so a concurrent claim
    // loses on rows_affected rather than double-crediting.
    let affected = sqlx::query(
        r#"UPDATE "daily_tasks" SET "rewardClaimed" = 1
           WHERE "id" = ? AND "rewardClaimed" = 0"#,
    )
    .bind(task_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(ServiceError::AlreadyClaimed);
    }

    credit_user_xp(&mut *tx, user_id, reward_xp).await?;

    tx.commit().await?;
    Ok(reward_xp)
}
