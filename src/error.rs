use thiserror::Error;

/// Error taxonomy for the learning core.
///
/// Validation, conflict, and not-found errors are caller-visible typed
/// results and must be raised before any state mutation. Database errors
/// abort the surrounding transaction; callers holding an idempotency key
/// may retry them safely. Invariant errors are programming errors and are
/// never surfaced as user-facing messages.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("a learning session is already active for this user")]
    SessionAlreadyActive,

    #[error("session already ended with a different xp total")]
    SessionAlreadyEnded,

    #[error("task reward already claimed")]
    AlreadyClaimed,

    #[error("task progress has not reached its target")]
    TaskIncomplete,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}
