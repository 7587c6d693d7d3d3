//! End-to-end tests for the learning core against an in-memory SQLite
//! database. Time is always passed explicitly so every scenario is
//! deterministic.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use lingua_trip_backend::config::Config;
use lingua_trip_backend::db::Database;
use lingua_trip_backend::error::ServiceError;
use lingua_trip_backend::seed;
use lingua_trip_backend::services::scheduler::{CardState, Rating};
use lingua_trip_backend::services::{due_queue, progress, session, stats, streak};

const USER: &str = "user-1";

fn test_config() -> Config {
    let mut config = Config::default();
    config.scheduler.fuzz_enabled = false;
    config
}

fn at(date: &str, hour: u32) -> DateTime<Utc> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
}

async fn test_db() -> Database {
    let db = Database::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    seed::seed_badge_definitions(db.pool()).await.unwrap();
    db
}

async fn insert_word(db: &Database, id: &str, sequence: i64) {
    sqlx::query(
        r#"INSERT INTO "vocabulary" ("id", "term", "language", "translation", "sequence")
           VALUES (?, ?, 'es', 'meaning', ?)"#,
    )
    .bind(id)
    .bind(format!("term-{id}"))
    .bind(sequence)
    .execute(db.pool())
    .await
    .unwrap();
}

async fn review(
    db: &Database,
    config: &Config,
    word: &str,
    rating: Rating,
    now: DateTime<Utc>,
) -> progress::ReviewOutcome {
    progress::submit_review(
        db.pool(),
        config,
        USER,
        word,
        rating,
        None,
        now,
        &mut StdRng::seed_from_u64(42),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn first_review_creates_progress_in_learning() {
    let db = test_db().await;
    let config = test_config();
    insert_word(&db, "w1", 0).await;

    let now = at("2026-03-01", 12);
    let outcome = review(&db, &config, "w1", Rating::Good, now).await;

    assert!(!outcome.duplicate);
    assert_eq!(outcome.progress.state, CardState::Learning);
    assert_eq!(outcome.progress.reps, 1);
    assert_eq!(outcome.xp_earned, config.xp.good);
    assert!(outcome.progress.due_at > now);
}

#[tokio::test]
async fn review_chain_graduates_and_lapses() {
    let db = test_db().await;
    let config = test_config();
    insert_word(&db, "w1", 0).await;

    let d0 = at("2026-03-01", 12);
    review(&db, &config, "w1", Rating::Good, d0).await;

    let d0_later = d0 + Duration::minutes(15);
    let graduated = review(&db, &config, "w1", Rating::Good, d0_later).await;
    assert_eq!(graduated.progress.state, CardState::Review);
    assert!(graduated.progress.due_at >= d0_later + Duration::days(1));

    let d5 = at("2026-03-06", 12);
    let lapsed = review(&db, &config, "w1", Rating::Again, d5).await;
    assert_eq!(lapsed.progress.state, CardState::Relearning);
    assert_eq!(lapsed.progress.lapses, 1);
    assert!(lapsed.progress.stability < graduated.progress.stability);
}

#[tokio::test]
async fn idempotent_review_replays_stored_outcome() {
    let db = test_db().await;
    let config = test_config();
    insert_word(&db, "w1", 0).await;

    let now = at("2026-03-01", 12);
    let mut rng = StdRng::seed_from_u64(1);
    let first = progress::submit_review(
        db.pool(),
        &config,
        USER,
        "w1",
        Rating::Good,
        Some("key-1"),
        now,
        &mut rng,
    )
    .await
    .unwrap();

    let replay = progress::submit_review(
        db.pool(),
        &config,
        USER,
        "w1",
        Rating::Easy,
        Some("key-1"),
        now + Duration::hours(1),
        &mut rng,
    )
    .await
    .unwrap();

    assert!(replay.duplicate);
    assert_eq!(replay.progress.reps, first.progress.reps);
    assert_eq!(replay.xp_earned, first.xp_earned);
    assert!(replay.new_badges.is_empty());

    let events: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "review_events" WHERE "userId" = ?"#)
            .bind(USER)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(events, 1, "replay must not append a second event");
}

#[tokio::test]
async fn unknown_vocabulary_is_rejected_before_any_write() {
    let db = test_db().await;
    let config = test_config();

    let err = progress::submit_review(
        db.pool(),
        &config,
        USER,
        "missing",
        Rating::Good,
        None,
        at("2026-03-01", 12),
        &mut StdRng::seed_from_u64(1),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let events: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "review_events""#)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(events, 0);
}

#[tokio::test]
async fn consecutive_days_extend_streak_and_gap_resets() {
    let db = test_db().await;
    let mut conn = db.pool().acquire().await.unwrap();

    let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();

    let s1 = streak::record_activity(&mut *conn, USER, d("2026-03-01")).await.unwrap();
    assert_eq!(s1.current_streak, 1);

    let s2 = streak::record_activity(&mut *conn, USER, d("2026-03-02")).await.unwrap();
    assert_eq!(s2.current_streak, 2);

    let s3 = streak::record_activity(&mut *conn, USER, d("2026-03-03")).await.unwrap();
    assert_eq!(s3.current_streak, 3);
    assert_eq!(s3.longest_streak, 3);

    // Same day again: no change.
    let s3b = streak::record_activity(&mut *conn, USER, d("2026-03-03")).await.unwrap();
    assert_eq!(s3b.current_streak, 3);

    // Gap: reset to 1, longest preserved.
    let s4 = streak::record_activity(&mut *conn, USER, d("2026-03-08")).await.unwrap();
    assert_eq!(s4.current_streak, 1);
    assert_eq!(s4.longest_streak, 3);
}

#[tokio::test]
async fn only_one_active_session_per_user() {
    let db = test_db().await;
    let now = at("2026-03-01", 12);

    let first = session::start_session(
        db.pool(),
        USER,
        session::SessionType::Mixed,
        None,
        None,
        now,
    )
    .await
    .unwrap();

    let err = session::start_session(
        db.pool(),
        USER,
        session::SessionType::Learn,
        None,
        None,
        now + Duration::minutes(1),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::SessionAlreadyActive));

    // A different user is unaffected.
    session::start_session(
        db.pool(),
        "user-2",
        session::SessionType::Learn,
        None,
        None,
        now,
    )
    .await
    .unwrap();

    // Ending the first allows a new one.
    session::end_session(db.pool(), USER, &first.id, 30, now + Duration::hours(1), 0)
        .await
        .unwrap();
    session::start_session(
        db.pool(),
        USER,
        session::SessionType::Review,
        None,
        None,
        now + Duration::hours(2),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn ending_a_session_is_idempotent_on_same_xp() {
    let db = test_db().await;
    let now = at("2026-03-01", 12);

    let started = session::start_session(
        db.pool(),
        USER,
        session::SessionType::Mixed,
        None,
        None,
        now,
    )
    .await
    .unwrap();

    let (ended, _) = session::end_session(db.pool(), USER, &started.id, 25, now + Duration::hours(1), 0)
        .await
        .unwrap();
    assert_eq!(ended.xp_earned, 25);
    assert!(ended.ended_at.is_some());

    let (repeat, badges) =
        session::end_session(db.pool(), USER, &started.id, 25, now + Duration::hours(2), 0)
            .await
            .unwrap();
    assert_eq!(repeat.xp_earned, 25);
    assert!(badges.is_empty());

    let err = session::end_session(db.pool(), USER, &started.id, 99, now + Duration::hours(3), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionAlreadyEnded));

    let sessions: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "learning_sessions" WHERE "userId" = ? AND "endedAt" IS NOT NULL"#,
    )
    .bind(USER)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(sessions, 1);
}

#[tokio::test]
async fn first_close_wins_and_keeps_its_timestamp() {
    let db = test_db().await;
    let now = at("2026-03-02", 9);

    let started = session::start_session(
        db.pool(),
        USER,
        session::SessionType::Learn,
        None,
        None,
        now,
    )
    .await
    .unwrap();

    // Two enders race for the same session; the pool serializes them, so
    // one closes it and the other replays the stored close.
    let (first, second) = tokio::join!(
        session::end_session(db.pool(), USER, &started.id, 40, now + Duration::hours(1), 0),
        session::end_session(db.pool(), USER, &started.id, 40, now + Duration::hours(1), 0),
    );
    let (first, _) = first.unwrap();
    let (second, _) = second.unwrap();
    assert_eq!(first.xp_earned, 40);
    assert_eq!(second.xp_earned, 40);

    // A later repeat must not move the close timestamp forward.
    let (repeat, _) =
        session::end_session(db.pool(), USER, &started.id, 40, now + Duration::hours(5), 0)
            .await
            .unwrap();
    assert_eq!(repeat.ended_at, first.ended_at);

    let ended_at: Option<i64> = sqlx::query_scalar(
        r#"SELECT "endedAt" FROM "learning_sessions" WHERE "id" = ?"#,
    )
    .bind(&started.id)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(ended_at, Some((now + Duration::hours(1)).timestamp_millis()));
}

#[tokio::test]
async fn task_reward_claims_exactly_once() {
    let db = test_db().await;
    let config = test_config();
    for i in 0..10 {
        insert_word(&db, &format!("w{i}"), i).await;
    }

    // Ten reviews in one day complete the words_reviewed task.
    let now = at("2026-03-01", 12);
    for i in 0..10 {
        review(&db, &config, &format!("w{i}"), Rating::Good, now).await;
    }

    let mut conn = db.pool().acquire().await.unwrap();
    let date = NaiveDate::parse_from_str("2026-03-01", "%Y-%m-%d").unwrap();
    let tasks = streak::list_daily_tasks(&mut *conn, USER, date).await.unwrap();
    let reviewed = tasks
        .iter()
        .find(|t| t.task_type == streak::TaskType::WordsReviewed)
        .unwrap();
    assert_eq!(reviewed.progress, reviewed.target);
    drop(conn);

    let xp_before: i64 =
        sqlx::query_scalar(r#"SELECT "totalXp" FROM "user_stats" WHERE "userId" = ?"#)
            .bind(USER)
            .fetch_one(db.pool())
            .await
            .unwrap();

    let reward = streak::claim_task_reward(db.pool(), USER, &reviewed.id)
        .await
        .unwrap();
    assert_eq!(reward, reviewed.reward_xp);

    let err = streak::claim_task_reward(db.pool(), USER, &reviewed.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyClaimed));

    let xp_after: i64 =
        sqlx::query_scalar(r#"SELECT "totalXp" FROM "user_stats" WHERE "userId" = ?"#)
            .bind(USER)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(xp_after, xp_before + reward, "reward credited exactly once");
}

#[tokio::test]
async fn claiming_incomplete_task_fails() {
    let db = test_db().await;
    let config = test_config();
    insert_word(&db, "w1", 0).await;
    review(&db, &config, "w1", Rating::Good, at("2026-03-01", 12)).await;

    let mut conn = db.pool().acquire().await.unwrap();
    let date = NaiveDate::parse_from_str("2026-03-01", "%Y-%m-%d").unwrap();
    let tasks = streak::list_daily_tasks(&mut *conn, USER, date).await.unwrap();
    let reviewed = tasks
        .iter()
        .find(|t| t.task_type == streak::TaskType::WordsReviewed)
        .unwrap();
    assert!(reviewed.progress < reviewed.target);
    drop(conn);

    let err = streak::claim_task_reward(db.pool(), USER, &reviewed.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TaskIncomplete));
}

#[tokio::test]
async fn badges_unlock_at_most_once() {
    let db = test_db().await;
    let config = test_config();
    for i in 0..12 {
        insert_word(&db, &format!("w{i}"), i).await;
    }

    let now = at("2026-03-01", 12);
    let mut unlocked_first_steps = 0;
    for i in 0..12 {
        let outcome = review(&db, &config, &format!("w{i}"), Rating::Good, now).await;
        unlocked_first_steps += outcome
            .new_badges
            .iter()
            .filter(|b| b.badge_id == "first-steps")
            .count();
    }
    assert_eq!(unlocked_first_steps, 1, "10-word badge unlocks exactly once");

    let rows: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "user_badges" WHERE "userId" = ? AND "badgeId" = 'first-steps'"#,
    )
    .bind(USER)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn due_queue_orders_overdue_before_new_and_respects_daily_cap() {
    let db = test_db().await;
    let mut config = test_config();
    config.due_queue.daily_new_limit = 2;

    for i in 0..6 {
        insert_word(&db, &format!("w{i}"), i).await;
    }

    // Graduate w0 and w1 to Review with day-scale intervals, w1 first.
    let d0 = at("2026-03-01", 12);
    review(&db, &config, "w1", Rating::Easy, d0).await;
    review(&db, &config, "w0", Rating::Easy, d0 + Duration::hours(1)).await;

    // Far enough out that both are overdue.
    let later = at("2026-03-20", 12);
    let items = due_queue::select_due(db.pool(), &config, USER, Some(10), later)
        .await
        .unwrap();

    // Overdue first, earliest due date first, then new words capped at 2.
    assert_eq!(items[0].vocabulary.id, "w1");
    assert_eq!(items[1].vocabulary.id, "w0");
    assert!(items[0].progress.is_some());

    let new_items: Vec<&str> = items[2..]
        .iter()
        .map(|i| i.vocabulary.id.as_str())
        .collect();
    assert_eq!(new_items, vec!["w2", "w3"], "catalog order, capped at 2");
}

#[tokio::test]
async fn due_queue_does_not_repeat_items_within_a_session() {
    let db = test_db().await;
    let config = test_config();
    for i in 0..4 {
        insert_word(&db, &format!("w{i}"), i).await;
    }

    let now = at("2026-03-01", 12);
    session::start_session(db.pool(), USER, session::SessionType::Learn, None, None, now)
        .await
        .unwrap();

    let first = due_queue::select_due(db.pool(), &config, USER, Some(2), now)
        .await
        .unwrap();
    let second = due_queue::select_due(db.pool(), &config, USER, Some(10), now)
        .await
        .unwrap();

    let first_ids: Vec<&str> = first.iter().map(|i| i.vocabulary.id.as_str()).collect();
    for item in &second {
        assert!(
            !first_ids.contains(&item.vocabulary.id.as_str()),
            "{} served twice in one session",
            item.vocabulary.id
        );
    }
}

#[tokio::test]
async fn stats_reflect_reviews_sessions_and_badges() {
    let db = test_db().await;
    let config = test_config();
    for i in 0..3 {
        insert_word(&db, &format!("w{i}"), i).await;
    }

    let now = at("2026-03-01", 12);
    let started = session::start_session(db.pool(), USER, session::SessionType::Mixed, None, None, now)
        .await
        .unwrap();
    for i in 0..3 {
        review(&db, &config, &format!("w{i}"), Rating::Good, now).await;
    }
    session::end_session(db.pool(), USER, &started.id, 9, now + Duration::hours(1), 0)
        .await
        .unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    let today = stats::today_stats(&mut *conn, USER, now + Duration::hours(2), 0)
        .await
        .unwrap();
    assert_eq!(today.reviews_today, 3);
    assert_eq!(today.new_words_today, 3);
    assert_eq!(today.xp_today, 3 * config.xp.good);
    assert_eq!(today.streak.current_streak, 1);
    assert_eq!(today.tasks.len(), 3);

    let overall = stats::user_stats(&mut *conn, USER).await.unwrap();
    assert_eq!(overall.total_reviews, 3);
    assert_eq!(overall.words_tracked, 3);
    assert_eq!(overall.words_learned, 3);
    assert_eq!(overall.total_sessions, 1);
    assert_eq!(overall.total_xp, 3 * config.xp.good);
}

#[tokio::test]
async fn progress_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning.db");
    let url = format!("sqlite:{}?mode=rwc", path.display());

    let db = Database::connect(&url, 2).await.unwrap();
    db.migrate().await.unwrap();
    seed::seed_badge_definitions(db.pool()).await.unwrap();
    insert_word(&db, "w1", 0).await;
    let config = test_config();
    review(&db, &config, "w1", Rating::Good, at("2026-03-01", 12)).await;
    drop(db);

    let db = Database::connect(&url, 2).await.unwrap();
    db.migrate().await.unwrap();
    let mut conn = db.pool().acquire().await.unwrap();
    let record = progress::get_progress(&mut *conn, USER, "w1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.reps, 1);
    assert_eq!(record.state, CardState::Learning);
}

#[tokio::test]
async fn session_accumulates_review_xp_while_open() {
    let db = test_db().await;
    let config = test_config();
    insert_word(&db, "w1", 0).await;

    let now = at("2026-03-01", 12);
    let started = session::start_session(db.pool(), USER, session::SessionType::Mixed, None, None, now)
        .await
        .unwrap();

    review(&db, &config, "w1", Rating::Good, now).await;

    let mut conn = db.pool().acquire().await.unwrap();
    let active = session::get_active_session(&mut *conn, USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.id, started.id);
    assert_eq!(active.xp_earned, config.xp.good);
}
