//! Console and daily file logging.

use std::fs;
use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Overrides the configured level, e.g. `QUOTE_DESK_LOG=quote_desk=debug`.
pub const LOG_ENV: &str = "QUOTE_DESK_LOG";
pub const LOG_FILE_PREFIX: &str = "quote-desk.log";

/// Keeps the file writer flushing until dropped.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn level_filter(level: &str) -> LevelFilter {
    level.trim().parse::<LevelFilter>().unwrap_or(LevelFilter::INFO)
}

/// Installs the global subscriber. A log directory that cannot be created
/// leaves console logging only; a second call is a no-op.
pub fn init(log_dir: &Path, level: &str) -> LogGuard {
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(level_filter(level).into())
            .with_env_var(LOG_ENV)
            .from_env_lossy()
    };

    let console_layer = fmt::layer().with_target(true).with_filter(filter());

    let (file_layer, guard, dir_error) = match fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if let Some(err) = dir_error {
        tracing::warn!(dir = %log_dir.display(), error = %err, "file logging disabled");
    }
    if installed {
        tracing::info!(dir = %log_dir.display(), "logging initialised");
    }
    LogGuard { _file: guard }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse_with_info_fallback() {
        assert_eq!(level_filter("debug"), LevelFilter::DEBUG);
        assert_eq!(level_filter(" WARN "), LevelFilter::WARN);
        assert_eq!(level_filter("off"), LevelFilter::OFF);
        assert_eq!(level_filter("chatty"), LevelFilter::INFO);
    }
}
