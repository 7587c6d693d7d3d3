use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::SeedableRng;
use serde::Deserialize;

use crate::auth::require_user;
use crate::error::ServiceError;
use crate::response::{AppError, SuccessResponse};
use crate::services::due_queue::{self, DueItem};
use crate::services::progress::{self, ReviewOutcome};
use crate::services::scheduler::Rating;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/due", get(get_due))
        .route("/reviews", post(post_review))
}

#[derive(Deserialize)]
struct DueQuery {
    limit: Option<i64>,
}

async fn get_due(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DueQuery>,
) -> Result<Json<SuccessResponse<Vec<DueItem>>>, AppError> {
    let user = require_user(&headers)?;

    if let Some(limit) = query.limit {
        if limit <= 0 {
            return Err(AppError::validation("limit must be a positive integer"));
        }
    }

    let items = due_queue::select_due(
        state.db().pool(),
        state.config(),
        &user.id,
        query.limit,
        chrono::Utc::now(),
    )
    .await?;

    Ok(Json(SuccessResponse::new(items)))
}

/// Rating arrives either as its name ("good") or its numeric value (3).
#[derive(Deserialize)]
#[serde(untagged)]
enum RatingInput {
    Name(Rating),
    Value(i64),
}

impl RatingInput {
    fn resolve(self) -> Result<Rating, AppError> {
        match self {
            Self::Name(rating) => Ok(rating),
            Self::Value(value) => Rating::from_i64(value)
                .ok_or_else(|| AppError::validation("rating must be 1-4 or again|hard|good|easy")),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    vocabulary_id: String,
    rating: RatingInput,
    idempotency_key: Option<String>,
}

async fn post_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<SuccessResponse<ReviewOutcome>>, AppError> {
    let user = require_user(&headers)?;

    if body.vocabulary_id.trim().is_empty() {
        return Err(AppError::validation("vocabularyId is required"));
    }
    if let Some(key) = &body.idempotency_key {
        if key.trim().is_empty() {
            return Err(AppError::validation("idempotencyKey must not be blank"));
        }
    }
    let rating = body.rating.resolve()?;

    let mut rng = rand::rngs::StdRng::from_os_rng();
    let outcome = progress::submit_review(
        state.db().pool(),
        state.config(),
        &user.id,
        &body.vocabulary_id,
        rating,
        body.idempotency_key.as_deref(),
        chrono::Utc::now(),
        &mut rng,
    )
    .await?;

    Ok(Json(SuccessResponse::new(outcome)))
}

/// Shared helper for handlers that only need a single connection.
pub(crate) async fn acquire(
    state: &AppState,
) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, AppError> {
    state
        .db()
        .pool()
        .acquire()
        .await
        .map_err(ServiceError::from)
        .map_err(AppError::from)
}
