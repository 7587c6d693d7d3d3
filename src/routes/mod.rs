pub mod badges;
pub mod health;
pub mod learning;
pub mod sessions;
pub mod stats;
pub mod tasks;

use axum::http::StatusCode;
use axum::Router;

use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/learning", learning::router())
        .nest("/api/sessions", sessions::router())
        .nest("/api/tasks", tasks::router())
        .nest("/api/stats", stats::router())
        .nest("/api/badges", badges::router())
        .fallback(|| async { json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route not found") })
        .with_state(state)
}
