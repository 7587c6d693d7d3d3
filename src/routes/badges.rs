use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::require_user;
use crate::response::{AppError, SuccessResponse};
use crate::routes::learning::acquire;
use crate::services::badge::{self, BadgeStatus};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list))
}

async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse<Vec<BadgeStatus>>>, AppError> {
    let user = require_user(&headers)?;
    let mut conn = acquire(&state).await?;
    let badges = badge::badges_with_status(&mut *conn, &user.id).await?;
    Ok(Json(SuccessResponse::new(badges)))
}
