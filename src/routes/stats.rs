use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::require_user;
use crate::response::{AppError, SuccessResponse};
use crate::routes::learning::acquire;
use crate::services::stats::{self, TodayStats, UserStats};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(overall))
        .route("/today", get(today))
}

async fn today(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse<TodayStats>>, AppError> {
    let user = require_user(&headers)?;
    let mut conn = acquire(&state).await?;
    let stats = stats::today_stats(
        &mut *conn,
        &user.id,
        chrono::Utc::now(),
        state.config().streak_utc_offset_minutes,
    )
    .await?;
    Ok(Json(SuccessResponse::new(stats)))
}

async fn overall(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse<UserStats>>, AppError> {
    let user = require_user(&headers)?;
    let mut conn = acquire(&state).await?;
    let stats = stats::user_stats(&mut *conn, &user.id).await?;
    Ok(Json(SuccessResponse::new(stats)))
}
