//! Embedded SQLite schema for the learning core.
//!
//! Timestamps are stored as INTEGER unix milliseconds; calendar days
//! (streaks, daily tasks) as TEXT `YYYY-MM-DD`. All uniqueness guarantees
//! the scheduling contract relies on live here as constraints, not in
//! application code.

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS "vocabulary" (
    "id" TEXT PRIMARY KEY,
    "term" TEXT NOT NULL,
    "language" TEXT NOT NULL,
    "translation" TEXT NOT NULL DEFAULT '',
    "audioUrl" TEXT,
    "sequence" INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS "vocabulary_sequence"
    ON "vocabulary" ("language", "sequence");

CREATE TABLE IF NOT EXISTS "vocabulary_progress" (
    "id" TEXT PRIMARY KEY,
    "userId" TEXT NOT NULL,
    "vocabularyId" TEXT NOT NULL REFERENCES "vocabulary" ("id"),
    "state" TEXT NOT NULL DEFAULT 'NEW',
    "stability" REAL NOT NULL,
    "difficulty" REAL NOT NULL,
    "reps" INTEGER NOT NULL DEFAULT 0,
    "lapses" INTEGER NOT NULL DEFAULT 0,
    "dueAt" INTEGER NOT NULL,
    "lastReviewedAt" INTEGER,
    "createdAt" INTEGER NOT NULL,
    "updatedAt" INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS "vocabulary_progress_user_vocab"
    ON "vocabulary_progress" ("userId", "vocabularyId");

CREATE INDEX IF NOT EXISTS "vocabulary_progress_due"
    ON "vocabulary_progress" ("userId", "dueAt");

CREATE TABLE IF NOT EXISTS "review_events" (
    "id" TEXT PRIMARY KEY,
    "userId" TEXT NOT NULL,
    "vocabularyId" TEXT NOT NULL,
    "rating" INTEGER NOT NULL,
    "reviewedAt" INTEGER NOT NULL,
    "elapsedDays" REAL NOT NULL,
    "intervalDays" REAL NOT NULL,
    "xpEarned" INTEGER NOT NULL DEFAULT 0,
    "idempotencyKey" TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS "review_events_idempotency"
    ON "review_events" ("userId", "idempotencyKey")
    WHERE "idempotencyKey" IS NOT NULL;

CREATE INDEX IF NOT EXISTS "review_events_user_time"
    ON "review_events" ("userId", "reviewedAt");

CREATE TABLE IF NOT EXISTS "learning_sessions" (
    "id" TEXT PRIMARY KEY,
    "userId" TEXT NOT NULL,
    "sessionType" TEXT NOT NULL,
    "goalId" TEXT,
    "scenarioId" TEXT,
    "startedAt" INTEGER NOT NULL,
    "endedAt" INTEGER,
    "xpEarned" INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS "learning_sessions_active_user"
    ON "learning_sessions" ("userId")
    WHERE "endedAt" IS NULL;

CREATE TABLE IF NOT EXISTS "session_items" (
    "sessionId" TEXT NOT NULL REFERENCES "learning_sessions" ("id"),
    "vocabularyId" TEXT NOT NULL,
    PRIMARY KEY ("sessionId", "vocabularyId")
);

CREATE TABLE IF NOT EXISTS "daily_tasks" (
    "id" TEXT PRIMARY KEY,
    "userId" TEXT NOT NULL,
    "date" TEXT NOT NULL,
    "taskType" TEXT NOT NULL,
    "target" INTEGER NOT NULL,
    "progress" INTEGER NOT NULL DEFAULT 0,
    "rewardXp" INTEGER NOT NULL DEFAULT 0,
    "rewardClaimed" INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS "daily_tasks_user_date_type"
    ON "daily_tasks" ("userId", "date", "taskType");

CREATE TABLE IF NOT EXISTS "user_streaks" (
    "userId" TEXT PRIMARY KEY,
    "currentStreak" INTEGER NOT NULL DEFAULT 0,
    "longestStreak" INTEGER NOT NULL DEFAULT 0,
    "lastActiveDate" TEXT
);

CREATE TABLE IF NOT EXISTS "badge_definitions" (
    "id" TEXT PRIMARY KEY,
    "name" TEXT NOT NULL,
    "description" TEXT NOT NULL,
    "conditionType" TEXT NOT NULL,
    "threshold" REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS "user_badges" (
    "id" TEXT PRIMARY KEY,
    "userId" TEXT NOT NULL,
    "badgeId" TEXT NOT NULL REFERENCES "badge_definitions" ("id"),
    "unlockedAt" INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS "user_badges_user_badge"
    ON "user_badges" ("userId", "badgeId");

CREATE TABLE IF NOT EXISTS "user_stats" (
    "userId" TEXT PRIMARY KEY,
    "totalXp" INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS "_db_metadata" (
    "key" TEXT PRIMARY KEY,
    "value" TEXT NOT NULL
);
"#;

#[derive(Clone, Copy, PartialEq)]
enum SplitState {
    Normal,
    SingleQuote,
    DoubleQuote,
    LineComment,
}

/// Splits a multi-statement SQL script on semicolons. Tracks string literals
/// and quoted identifiers so embedded `;` survive, and strips `--` line
/// comments. SQLite escapes quotes by doubling them, which plain toggling
/// already handles.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = SplitState::Normal;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            SplitState::Normal => match ch {
                ';' => {
                    flush(&mut statements, &mut current);
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = SplitState::LineComment;
                }
                '\'' => {
                    state = SplitState::SingleQuote;
                    current.push(ch);
                }
                '"' => {
                    state = SplitState::DoubleQuote;
                    current.push(ch);
                }
                _ => current.push(ch),
            },
            SplitState::SingleQuote => {
                if ch == '\'' {
                    state = SplitState::Normal;
                }
                current.push(ch);
            }
            SplitState::DoubleQuote => {
                if ch == '"' {
                    state = SplitState::Normal;
                }
                current.push(ch);
            }
            SplitState::LineComment => {
                if ch == '\n' {
                    state = SplitState::Normal;
                    current.push(ch);
                }
            }
        }
    }

    flush(&mut statements, &mut current);
    statements
}

fn flush(statements: &mut Vec<String>, current: &mut String) {
    let stmt = current.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_statement_boundaries_only() {
        let sql = r#"CREATE TABLE "a" ("x" TEXT DEFAULT 'a;b'); INSERT INTO "a" VALUES ('y');"#;
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("a;b"));
    }

    #[test]
    fn line_comments_are_stripped() {
        let sql = "-- schema notes\nCREATE TABLE \"a\" (\"x\" TEXT); -- trailing remark\nINSERT INTO \"a\" VALUES ('y');";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(!stmts[0].contains("--"));
        assert!(!stmts[0].contains("remark"));
    }

    #[test]
    fn dashes_inside_literals_are_kept() {
        let sql = r#"CREATE TABLE "a" ("x" TEXT DEFAULT 'a--b');"#;
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("a--b"));
    }

    #[test]
    fn schema_has_no_empty_statements() {
        for stmt in split_sql_statements(SCHEMA_SQL) {
            assert!(!stmt.trim().is_empty());
        }
    }
}
