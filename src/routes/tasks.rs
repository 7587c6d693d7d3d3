use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::auth::require_user;
use crate::response::{AppError, SuccessResponse};
use crate::routes::learning::acquire;
use crate::services::streak::{self, DailyTask};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/:id/claim", post(claim))
}

#[derive(Deserialize)]
struct TasksQuery {
    date: Option<String>,
}

async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TasksQuery>,
) -> Result<Json<SuccessResponse<Vec<DailyTask>>>, AppError> {
    let user = require_user(&headers)?;

    let date = match &query.date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| AppError::validation("date must be formatted YYYY-MM-DD"))?,
        None => crate::services::activity_date(
            chrono::Utc::now(),
            state.config().streak_utc_offset_minutes,
        ),
    };

    let mut conn = acquire(&state).await?;
    // Today's tasks are created on first read; past dates are read as-is.
    let today = crate::services::activity_date(
        chrono::Utc::now(),
        state.config().streak_utc_offset_minutes,
    );
    let tasks = if date == today {
        streak::ensure_daily_tasks(&mut *conn, &user.id, date).await?
    } else {
        streak::list_daily_tasks(&mut *conn, &user.id, date).await?
    };

    Ok(Json(SuccessResponse::new(tasks)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimResult {
    task_id: String,
    reward_xp: i64,
}

async fn claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Json<SuccessResponse<ClaimResult>>, AppError> {
    let user = require_user(&headers)?;

    let reward_xp = streak::claim_task_reward(state.db().pool(), &user.id, &task_id).await?;

    Ok(Json(SuccessResponse::new(ClaimResult { task_id, reward_xp })))
}
