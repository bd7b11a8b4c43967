//! Logging setup: stdout plus an optional daily rotated log file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::errors::MonitorError;

const LOG_FILE_PREFIX: &str = "lnmon";
const LOG_FILE_SUFFIX: &str = "log";

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG` when set and from the configured level
/// otherwise. The returned guard flushes the file writer and must be held
/// for the lifetime of the process.
pub fn init_logging(cfg: &LogConfig) -> Result<Option<WorkerGuard>, MonitorError> {
    let filter = build_filter(&cfg.level)?;

    let (file_layer, guard) = match &cfg.dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix(LOG_FILE_SUFFIX)
                .max_log_files(cfg.max_files)
                .build(dir)
                .map_err(|e| {
                    MonitorError::Config(format!(
                        "cannot open log directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(file_layer)
        .try_init()
        .map_err(|e| MonitorError::Config(format!("cannot install logger: {}", e)))?;

    Ok(guard)
}

fn build_filter(level: &str) -> Result<EnvFilter, MonitorError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| MonitorError::Config(format!("invalid log level {:?}: {}", level, e))),
    }
}
