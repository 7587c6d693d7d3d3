//! Startup seeding. Both seeders are idempotent (INSERT OR IGNORE) so
//! restarting the server is always safe.

use sqlx::SqlitePool;

use crate::error::ServiceError;

const BADGE_DEFINITIONS: &[(&str, &str, &str, &str, i64)] = &[
    (
        "first-steps",
        "First Steps",
        "Learn your first 10 words",
        "words_learned",
        10,
    ),
    (
        "wordsmith",
        "Wordsmith",
        "Learn 100 words",
        "words_learned",
        100,
    ),
    (
        "lexicon",
        "Walking Lexicon",
        "Learn 500 words",
        "words_learned",
        500,
    ),
    ("warming-up", "Warming Up", "Keep a 3-day streak", "streak", 3),
    ("on-fire", "On Fire", "Keep a 7-day streak", "streak", 7),
    (
        "unstoppable",
        "Unstoppable",
        "Keep a 30-day streak",
        "streak",
        30,
    ),
    ("grinder", "Grinder", "Earn 1000 XP", "total_xp", 1_000),
    ("legend", "Legend", "Earn 10000 XP", "total_xp", 10_000),
    (
        "regular",
        "Regular",
        "Complete 10 sessions",
        "total_sessions",
        10,
    ),
    (
        "devoted",
        "Devoted",
        "Complete 100 sessions",
        "total_sessions",
        100,
    ),
];

pub async fn seed_badge_definitions(pool: &SqlitePool) -> Result<(), ServiceError> {
    for (id, name, description, condition_type, threshold) in BADGE_DEFINITIONS {
        sqlx::query(
            r#"INSERT OR IGNORE INTO "badge_definitions"
               ("id", "name", "description", "conditionType", "threshold")
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(condition_type)
        .bind(*threshold as f64)
        .execute(pool)
        .await?;
    }
    tracing::debug!(count = BADGE_DEFINITIONS.len(), "badge catalog seeded");
    Ok(())
}

/// A small starter catalog so a fresh database has something to study.
/// Real deployments import their own vocabulary.
pub async fn seed_demo_vocabulary(pool: &SqlitePool) -> Result<(), ServiceError> {
    const WORDS: &[(&str, &str, &str)] = &[
        ("hola", "es", "hello"),
        ("gracias", "es", "thank you"),
        ("por favor", "es", "please"),
        ("buenos días", "es", "good morning"),
        ("adiós", "es", "goodbye"),
        ("agua", "es", "water"),
        ("comida", "es", "food"),
        ("amigo", "es", "friend"),
        ("casa", "es", "house"),
        ("tiempo", "es", "time"),
    ];

    for (sequence, (term, language, translation)) in WORDS.iter().enumerate() {
        sqlx::query(
            r#"INSERT OR IGNORE INTO "vocabulary"
               ("id", "term", "language", "translation", "audioUrl", "sequence")
               VALUES (?, ?, ?, ?, NULL, ?)"#,
        )
        .bind(format!("demo-{language}-{sequence}"))
        .bind(term)
        .bind(language)
        .bind(translation)
        .bind(sequence as i64)
        .execute(pool)
        .await?;
    }
    Ok(())
}
