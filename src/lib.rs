pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod response;
pub mod routes;
pub mod seed;
pub mod services;
pub mod state;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::Database;
use crate::state::AppState;

/// Builds the application router around an already-migrated database.
/// Used by `main` and by the router-level tests.
pub fn create_app(db: Database, config: Config) -> axum::Router {
    let state = AppState::new(db, config);

    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
