use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::require_user;
use crate::response::{AppError, SuccessResponse};
use crate::routes::learning::acquire;
use crate::services::badge::UserBadge;
use crate::services::session::{self, LearningSession, SessionType};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start))
        .route("/active", get(active))
        .route("/:id/end", post(end))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    session_type: String,
    goal_id: Option<String>,
    scenario_id: Option<String>,
}

async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StartRequest>,
) -> Result<Json<SuccessResponse<LearningSession>>, AppError> {
    let user = require_user(&headers)?;

    let Some(session_type) = SessionType::parse(&body.session_type) else {
        return Err(AppError::validation(
            "sessionType must be learn, review or mixed",
        ));
    };

    let session = session::start_session(
        state.db().pool(),
        &user.id,
        session_type,
        body.goal_id,
        body.scenario_id,
        chrono::Utc::now(),
    )
    .await?;

    Ok(Json(SuccessResponse::new(session)))
}

async fn active(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse<Option<LearningSession>>>, AppError> {
    let user = require_user(&headers)?;
    let mut conn = acquire(&state).await?;
    let session = session::get_active_session(&mut *conn, &user.id).await?;
    Ok(Json(SuccessResponse::new(session)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndRequest {
    xp_earned: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EndedSession {
    #[serde(flatten)]
    session: LearningSession,
    new_badges: Vec<UserBadge>,
}

async fn end(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(body): Json<EndRequest>,
) -> Result<Json<SuccessResponse<EndedSession>>, AppError> {
    let user = require_user(&headers)?;

    let (session, new_badges) = session::end_session(
        state.db().pool(),
        &user.id,
        &session_id,
        body.xp_earned,
        chrono::Utc::now(),
        state.config().streak_utc_offset_minutes,
    )
    .await?;

    Ok(Json(SuccessResponse::new(EndedSession {
        session,
        new_badges,
    })))
}
