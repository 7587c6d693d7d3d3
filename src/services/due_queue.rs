//! Due-queue selection: overdue reviews first, ordered by how overdue
//! they are, then unseen words in catalog order under the daily-new cap.
//! Words already served to the user's open session are excluded so a
//! client paging through a session never sees repeats.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::config::Config;
use crate::error::ServiceError;
use crate::services::progress::ProgressRecord;
use crate::services::scheduler::CardState;
use crate::services::{from_millis, session, to_millis};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vocabulary {
    pub id: String,
    pub term: String,
    pub language: String,
    pub translation: String,
    pub audio_url: Option<String>,
    pub sequence: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueItem {
    #[serde(flatten)]
    pub vocabulary: Vocabulary,
    pub progress: Option<ProgressRecord>,
}

fn row_to_vocabulary(row: &SqliteRow) -> Result<Vocabulary, sqlx::Error> {
    Ok(Vocabulary {
        id: row.try_get("id")?,
        term: row.try_get("term")?,
        language: row.try_get("language")?,
        translation: row.try_get("translation")?,
        audio_url: row.try_get("audioUrl")?,
        sequence: row.try_get("sequence")?,
    })
}

/// UTC instant at which the user's current activity day began, honoring
/// the configured day-boundary offset.
fn day_start(now: DateTime<Utc>, utc_offset_minutes: i64) -> DateTime<Utc> {
    let local_date = crate::services::activity_date(now, utc_offset_minutes);
    local_date.and_time(NaiveTime::MIN).and_utc() - Duration::minutes(utc_offset_minutes)
}

/// Selects up to `limit` items for the user to study now and, when a
/// session is open, records them as served to that session.
pub async fn select_due(
    pool: &SqlitePool,
    config: &Config,
    user_id: &str,
    limit: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Vec<DueItem>, ServiceError> {
    let limit = limit
        .unwrap_or(config.due_queue.default_limit)
        .clamp(1, config.due_queue.max_limit);

    let mut tx = pool.begin().await?;

    let active = session::get_active_session(&mut *tx, user_id).await?;
    // An empty id matches no session_items row, so the exclusion clause
    // is inert when no session is open.
    let exclusion_session = active
        .as_ref()
        .map(|s| s.id.clone())
        .unwrap_or_default();

    let now_ms = to_millis(now);
    let mut items: Vec<DueItem> = Vec::new();

    let overdue_rows = sqlx::query(
        r#"SELECT "v"."id", "v"."term", "v"."language", "v"."translation", "v"."audioUrl", "v"."sequence",
                  "p"."id" AS "progressId", "p"."state", "p"."stability", "p"."difficulty",
                  "p"."reps", "p"."lapses", "p"."dueAt", "p"."lastReviewedAt"
           FROM "vocabulary_progress" "p"
           JOIN "vocabulary" "v" ON "v"."id" = "p"."vocabularyId"
           WHERE "p"."userId" = ? AND "p"."state" != 'NEW' AND "p"."dueAt" <= ?
             AND "v"."id" NOT IN
               (SELECT "vocabularyId" FROM "session_items" WHERE "sessionId" = ?)
           ORDER BY "p"."dueAt" ASC
           LIMIT ?"#,
    )
    .bind(user_id)
    .bind(now_ms)
    .bind(&exclusion_session)
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    for row in &overdue_rows {
        let raw_state: String = row.try_get("state")?;
        items.push(DueItem {
            vocabulary: row_to_vocabulary(row)?,
            progress: Some(ProgressRecord {
                id: row.try_get("progressId")?,
                user_id: user_id.to_string(),
                vocabulary_id: row.try_get("id")?,
                state: CardState::parse(&raw_state),
                stability: row.try_get("stability")?,
                difficulty: row.try_get("difficulty")?,
                reps: row.try_get("reps")?,
                lapses: row.try_get("lapses")?,
                due_at: from_millis(row.try_get("dueAt")?),
                last_reviewed_at: row
                    .try_get::<Option<i64>, _>("lastReviewedAt")?
                    .map(from_millis),
            }),
        });
    }

    let remaining = limit - items.len() as i64;
    if remaining > 0 {
        let day_start_ms = to_millis(day_start(now, config.streak_utc_offset_minutes));
        let introduced_today: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM "vocabulary_progress"
               WHERE "userId" = ? AND "createdAt" >= ?"#,
        )
        .bind(user_id)
        .bind(day_start_ms)
        .fetch_one(&mut *tx)
        .await?;

        let allowance = (config.due_queue.daily_new_limit - introduced_today).max(0);
        let new_limit = remaining.min(allowance);

        if new_limit > 0 {
            let new_rows = sqlx::query(
                r#"SELECT "v"."id", "v"."term", "v"."language", "v"."translation", "v"."audioUrl", "v"."sequence"
                   FROM "vocabulary" "v"
                   LEFT JOIN "vocabulary_progress" "p"
                     ON "p"."vocabularyId" = "v"."id" AND "p"."userId" = ?
                   WHERE ("p"."id" IS NULL OR "p"."state" = 'NEW')
                     AND "v"."id" NOT IN
                       (SELECT "vocabularyId" FROM "session_items" WHERE "sessionId" = ?)
                   ORDER BY "v"."sequence" ASC
                   LIMIT ?"#,
            )
            .bind(user_id)
            .bind(&exclusion_session)
            .bind(new_limit)
            .fetch_all(&mut *tx)
            .await?;

            for row in &new_rows {
                items.push(DueItem {
                    vocabulary: row_to_vocabulary(row)?,
                    progress: None,
                });
            }
        }
    }

    if let Some(active) = &active {
        let served: Vec<String> = items.iter().map(|i| i.vocabulary.id.clone()).collect();
        session::add_session_items(&mut *tx, &active.id, &served).await?;
    }

    tx.commit().await?;

    Ok(items)
}
