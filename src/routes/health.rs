use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::response::SuccessResponse;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthStatus {
    status: &'static str,
    uptime_seconds: u64,
    database: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<SuccessResponse<HealthStatus>> {
    let database = if state.db().ping().await {
        "ok"
    } else {
        "unreachable"
    };

    Json(SuccessResponse::new(HealthStatus {
        status: "ok",
        uptime_seconds: state.uptime_seconds(),
        database,
    }))
}
