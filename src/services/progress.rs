//! Per-user vocabulary progress and the review pipeline. `submit_review`
//! is the one write path for memory state: the schedule step, the event
//! log, streak/task updates, XP credit and badge evaluation all commit in
//! a single transaction.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

use crate::config::Config;
use crate::error::ServiceError;
use crate::services::badge::{self, UserBadge};
use crate::services::scheduler::{self, CardState, MemoryState, Rating};
use crate::services::session;
use crate::services::streak::{self, TaskType, UserStreak};
use crate::services::{from_millis, is_unique_violation, to_millis};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: String,
    pub user_id: String,
    pub vocabulary_id: String,
    pub state: CardState,
    pub stability: f64,
    pub difficulty: f64,
    pub reps: i64,
    pub lapses: i64,
    pub due_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    pub fn memory(&self) -> MemoryState {
        MemoryState {
            state: self.state,
            stability: self.stability,
            difficulty: self.difficulty,
            reps: self.reps,
            lapses: self.lapses,
            due_at: self.due_at,
            last_reviewed_at: self.last_reviewed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub progress: ProgressRecord,
    pub xp_earned: i64,
    pub streak: UserStreak,
    pub new_badges: Vec<UserBadge>,
    /// True when an idempotency key matched an earlier review and the
    /// stored outcome was returned instead of scheduling again.
    pub duplicate: bool,
}

fn row_to_progress(row: &SqliteRow) -> Result<ProgressRecord, sqlx::Error> {
    let raw_state: String = row.try_get("state")?;
    Ok(ProgressRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        vocabulary_id: row.try_get("vocabularyId")?,
        state: CardState::parse(&raw_state),
        stability: row.try_get("stability")?,
        difficulty: row.try_get("difficulty")?,
        reps: row.try_get("reps")?,
        lapses: row.try_get("lapses")?,
        due_at: from_millis(row.try_get("dueAt")?),
        last_reviewed_at: row
            .try_get::<Option<i64>, _>("lastReviewedAt")?
            .map(from_millis),
    })
}

const PROGRESS_COLUMNS: &str = r#""id", "userId", "vocabularyId", "state", "stability", "difficulty", "reps", "lapses", "dueAt", "lastReviewedAt""#;

pub async fn get_progress(
    conn: &mut SqliteConnection,
    user_id: &str,
    vocabulary_id: &str,
) -> Result<Option<ProgressRecord>, ServiceError> {
    let query = format!(
        r#"SELECT {PROGRESS_COLUMNS} FROM "vocabulary_progress"
           WHERE "userId" = ? AND "vocabularyId" = ?"#
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(vocabulary_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(match row {
        Some(row) => Some(row_to_progress(&row)?),
        None => None,
    })
}

async fn upsert_progress(
    conn: &mut SqliteConnection,
    record: &ProgressRecord,
    now_ms: i64,
) -> Result<(), ServiceError> {
    sqlx::query(
        r#"INSERT INTO "vocabulary_progress"
           ("id", "userId", "vocabularyId", "state", "stability", "difficulty",
            "reps", "lapses", "dueAt", "lastReviewedAt", "createdAt", "updatedAt")
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT ("userId", "vocabularyId") DO UPDATE SET
             "state" = excluded."state",
             "stability" = excluded."stability",
             "difficulty" = excluded."difficulty",
             "reps" = excluded."reps",
             "lapses" = excluded."lapses",
             "dueAt" = excluded."dueAt",
             "lastReviewedAt" = excluded."lastReviewedAt",
             "updatedAt" = excluded."updatedAt""#,
    )
    .bind(&record.id)
    .bind(&record.user_id)
    .bind(&record.vocabulary_id)
    .bind(record.state.as_str())
    .bind(record.stability)
    .bind(record.difficulty)
    .bind(record.reps)
    .bind(record.lapses)
    .bind(to_millis(record.due_at))
    .bind(record.last_reviewed_at.map(to_millis))
    .bind(now_ms)
    .bind(now_ms)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Adds XP to the user's lifetime total, creating the stats row on first
/// credit.
pub async fn credit_user_xp(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
) -> Result<(), ServiceError> {
    if amount <= 0 {
        return Ok(());
    }
    sqlx::query(
        r#"INSERT INTO "user_stats" ("userId", "totalXp") VALUES (?, ?)
           ON CONFLICT ("userId") DO UPDATE SET "totalXp" = "totalXp" + excluded."totalXp""#,
    )
    .bind(user_id)
    .bind(amount)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn xp_for(config: &Config, rating: Rating) -> i64 {
    match rating {
        Rating::Again => config.xp.again,
        Rating::Hard => config.xp.hard,
        Rating::Good => config.xp.good,
        Rating::Easy => config.xp.easy,
    }
}

/// Applies one review. Creates the progress row on first exposure,
/// advances the memory state, appends to the event log, updates streak
/// and daily tasks, credits XP (user total plus the active session's
/// running total) and evaluates badges, all atomically.
///
/// A retried request carrying the same idempotency key returns the
/// stored state without scheduling, crediting or unlocking anything.
pub async fn submit_review(
    pool: &SqlitePool,
    config: &Config,
    user_id: &str,
    vocabulary_id: &str,
    rating: Rating,
    idempotency_key: Option<&str>,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<ReviewOutcome, ServiceError> {
    let mut tx = pool.begin().await?;

    let vocab_exists = sqlx::query(r#"SELECT "id" FROM "vocabulary" WHERE "id" = ?"#)
        .bind(vocabulary_id)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();
    if !vocab_exists {
        return Err(ServiceError::validation(format!(
            "unknown vocabulary: {vocabulary_id}"
        )));
    }

    if let Some(key) = idempotency_key {
        if let Some(outcome) = replay_outcome(&mut *tx, user_id, vocabulary_id, key).await? {
            return Ok(outcome);
        }
    }

    let previous = get_progress(&mut *tx, user_id, vocabulary_id).await?;
    let first_exposure = previous.is_none();
    let (progress_id, prev_memory) = match &previous {
        Some(record) => (record.id.clone(), record.memory()),
        None => (
            uuid::Uuid::new_v4().to_string(),
            MemoryState::new_item(now),
        ),
    };

    let outcome = scheduler::schedule(&prev_memory, rating, now, &config.scheduler, rng);
    let next = &outcome.state;
    if next.stability <= 0.0 || next.due_at < now {
        return Err(ServiceError::Invariant(format!(
            "scheduler produced invalid state for {vocabulary_id}: stability={}, dueAt={}",
            next.stability, next.due_at
        )));
    }

    let record = ProgressRecord {
        id: progress_id,
        user_id: user_id.to_string(),
        vocabulary_id: vocabulary_id.to_string(),
        state: next.state,
        stability: next.stability,
        difficulty: next.difficulty,
        reps: next.reps,
        lapses: next.lapses,
        due_at: next.due_at,
        last_reviewed_at: next.last_reviewed_at,
    };

    let now_ms = to_millis(now);
    upsert_progress(&mut *tx, &record, now_ms).await?;

    let xp = xp_for(config, rating);
    let insert = sqlx::query(
        r#"INSERT INTO "review_events"
           ("id", "userId", "vocabularyId", "rating", "reviewedAt",
            "elapsedDays", "intervalDays", "xpEarned", "idempotencyKey")
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(vocabulary_id)
    .bind(rating.as_i64())
    .bind(now_ms)
    .bind(outcome.elapsed_days)
    .bind(outcome.interval_days)
    .bind(xp)
    .bind(idempotency_key)
    .execute(&mut *tx)
    .await;

    match insert {
        Ok(_) => {}
        // Lost an idempotency race: abandon this attempt and serve the
        // winner's stored outcome.
        Err(err) if is_unique_violation(&err) => {
            drop(tx);
            if let Some(key) = idempotency_key {
                let mut conn = pool.acquire().await?;
                if let Some(outcome) = replay_outcome(&mut *conn, user_id, vocabulary_id, key).await?
                {
                    return Ok(outcome);
                }
            }
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    }

    let date = crate::services::activity_date(now, config.streak_utc_offset_minutes);
    let streak_state = streak::record_activity(&mut *tx, user_id, date).await?;
    streak::update_daily_task(&mut *tx, user_id, date, TaskType::WordsReviewed, 1).await?;
    if first_exposure {
        streak::update_daily_task(&mut *tx, user_id, date, TaskType::NewWords, 1).await?;
    }

    credit_user_xp(&mut *tx, user_id, xp).await?;
    session::add_xp_to_active_session(&mut *tx, user_id, xp).await?;

    let stats = badge::metrics_snapshot(&mut *tx, user_id).await?;
    let new_badges = badge::evaluate_badges(&mut *tx, user_id, &stats, now_ms).await?;

    tx.commit().await?;

    tracing::debug!(
        user = %user_id,
        vocabulary = %vocabulary_id,
        rating = rating.as_i64(),
        state = record.state.as_str(),
        interval_days = outcome.interval_days,
        "review recorded"
    );

    Ok(ReviewOutcome {
        progress: record,
        xp_earned: xp,
        streak: streak_state,
        new_badges,
        duplicate: false,
    })
}

/// Looks up a stored review by idempotency key. When found, the current
/// progress row is authoritative for the caller; no side effects rerun.
async fn replay_outcome(
    conn: &mut SqliteConnection,
    user_id: &str,
    vocabulary_id: &str,
    key: &str,
) -> Result<Option<ReviewOutcome>, ServiceError> {
    let prior = sqlx::query(
        r#"SELECT "vocabularyId", "xpEarned" FROM "review_events"
           WHERE "userId" = ? AND "idempotencyKey" = ?"#,
    )
    .bind(user_id)
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(prior) = prior else {
        return Ok(None);
    };

    let stored_vocab: String = prior.try_get("vocabularyId")?;
    if stored_vocab != vocabulary_id {
        return Err(ServiceError::validation(format!(
            "idempotency key {key} was used for a different vocabulary"
        )));
    }

    let progress = get_progress(&mut *conn, user_id, &stored_vocab)
        .await?
        .ok_or_else(|| {
            ServiceError::Invariant(format!(
                "review event exists without progress for {stored_vocab}"
            ))
        })?;
    let streak_state = streak::get_streak(&mut *conn, user_id).await?;

    Ok(Some(ReviewOutcome {
        progress,
        xp_earned: prior.try_get("xpEarned")?,
        streak: streak_state,
        new_badges: Vec::new(),
        duplicate: true,
    }))
}
