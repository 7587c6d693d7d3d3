use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::services::scheduler::SchedulerConfig;

/// Tunable selection policy for the due queue (§ due-queue selector).
/// The review/new mix is a product decision, not a fixed constant.
#[derive(Debug, Clone)]
pub struct DueQueueConfig {
    /// Hard cap on New words introduced per calendar day.
    pub daily_new_limit: i64,
    /// Default page size when the caller omits `limit`.
    pub default_limit: i64,
    /// Upper bound on a single `limit` value.
    pub max_limit: i64,
}

impl Default for DueQueueConfig {
    fn default() -> Self {
        Self {
            daily_new_limit: 20,
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// XP credited per review rating. Product-tunable.
#[derive(Debug, Clone, Copy)]
pub struct XpTable {
    pub again: i64,
    pub hard: i64,
    pub good: i64,
    pub easy: i64,
}

impl Default for XpTable {
    fn default() -> Self {
        Self {
            again: 1,
            hard: 2,
            good: 3,
            easy: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    /// Mirror log output to a daily-rolling file under `log_dir`.
    pub log_to_file: bool,
    pub log_dir: String,
    pub scheduler: SchedulerConfig,
    pub due_queue: DueQueueConfig,
    pub xp: XpTable,
    /// Day-boundary policy for streaks and daily tasks: minutes added to
    /// UTC before taking the calendar date. 0 means UTC midnight.
    pub streak_utc_offset_minutes: i64,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_to_file = env_bool("ENABLE_FILE_LOGS").unwrap_or(false);
        let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());

        let mut scheduler = SchedulerConfig::default();
        if let Some(retention) = env_f64("DESIRED_RETENTION") {
            scheduler.desired_retention = retention.clamp(0.7, 0.99);
        }
        if let Some(enabled) = env_bool("INTERVAL_FUZZ") {
            scheduler.fuzz_enabled = enabled;
        }

        let mut due_queue = DueQueueConfig::default();
        if let Some(limit) = env_i64("DAILY_NEW_LIMIT") {
            due_queue.daily_new_limit = limit.max(0);
        }

        let streak_utc_offset_minutes = env_i64("STREAK_UTC_OFFSET_MINUTES")
            .map(|value| value.clamp(-14 * 60, 14 * 60))
            .unwrap_or(0);

        Self {
            host,
            port,
            log_level,
            log_to_file,
            log_dir,
            scheduler,
            due_queue,
            xp: XpTable::default(),
            streak_utc_offset_minutes,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3000,
            log_level: "info".to_string(),
            log_to_file: false,
            log_dir: "./logs".to_string(),
            scheduler: SchedulerConfig::default(),
            due_queue: DueQueueConfig::default(),
            xp: XpTable::default(),
            streak_utc_offset_minutes: 0,
        }
    }
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse::<i64>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse::<f64>().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| v == "true" || v == "1")
}
