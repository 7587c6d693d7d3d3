use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "learning.log";

/// Keeps the non-blocking file writer flushing; hold it for the process
/// lifetime when file logging is on.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Installs the global subscriber: an env-filtered stdout layer, plus a
/// daily-rolling file layer when `Config::log_to_file` is set.
pub fn init_tracing(config: &Config) -> Option<FileLogGuard> {
    let env_filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match file_writer(config) {
        Some((writer, guard)) => (
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true),
            ),
            Some(FileLogGuard { _guard: guard }),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    guard
}

fn file_writer(config: &Config) -> Option<(NonBlocking, WorkerGuard)> {
    if !config.log_to_file {
        return None;
    }

    if let Err(err) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!(
            "failed to create log directory {}: {err}; logging to stdout only",
            config.log_dir
        );
        return None;
    }

    let appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, LOG_FILE_PREFIX);
    Some(tracing_appender::non_blocking(appender))
}
