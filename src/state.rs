use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::db::Database;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    db: Database,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            started_at: Instant::now(),
            db,
            config: Arc::new(config),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
