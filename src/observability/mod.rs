//! Observability and structured logging infrastructure.
//!
//! # Usage
//!
//! Initialize tracing at application startup and keep the guard alive:
//!
//! ```no_run
//! use referral_sync::observability;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Pretty console output, info level
//!     let _guard = observability::init_tracing(None, None, false)?;
//!
//!     // Run application...
//!     Ok(())
//! }
//! ```
//!
//! # Environment Configuration
//!
//! ```bash
//! # Component-specific levels
//! RUST_LOG=referral_sync=debug,sqlx=warn referral-sync sync --auto
//!
//! # JSON output for log aggregation
//! LOG_JSON=true referral-sync serve
//!
//! # Also write JSON logs to a daily-rotated file
//! LOG_FILE=./logs/referral-sync.log referral-sync serve
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{IndexerError, IndexerResult};

/// Filter used when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_FILTER: &str = "referral_sync=info,tower_http=info,warn";

/// Keeps the file log writer flushing; drop it only at shutdown.
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Build the filter from `RUST_LOG`, then `log_level`, then [`DEFAULT_FILTER`].
fn build_filter(log_level: Option<String>) -> EnvFilter {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        EnvFilter::new(filter)
    } else if let Some(level) = log_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(DEFAULT_FILTER)
    }
}

/// Initialize the tracing subscriber.
///
/// # Arguments
///
/// * `log_level` - Level or filter directive used when `RUST_LOG` is unset.
/// * `log_file` - Optional file path; enables a daily-rotated JSON log.
/// * `json_output` - JSON console output instead of the pretty format.
///
/// # Errors
///
/// Returns a config error if the log directory cannot be created or a
/// global subscriber is already installed.
pub fn init_tracing(
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    json_output: bool,
) -> IndexerResult<LogGuard> {
    let env_filter = build_filter(log_level);

    let console_layer = if json_output {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let mut file_guard = None;
    let file_layer = match log_file.as_deref() {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(directory).map_err(|e| {
                IndexerError::config(
                    format!("Cannot create log directory {}", directory.display()),
                    Some(Box::new(e)),
                )
            })?;

            let appender = tracing_appender::rolling::daily(
                directory,
                path.file_name()
                    .unwrap_or_else(|| OsStr::new("referral-sync.log")),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);

            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| IndexerError::config("Tracing already initialized", Some(Box::new(e))))?;

    info!(
        json_output,
        file_logging = log_file.is_some(),
        "Tracing initialized"
    );

    Ok(LogGuard { _file: file_guard })
}

/// Route logs to the test harness; later calls are no-ops.
///
/// Shows output with `cargo test -- --nocapture`.
pub fn init_test_tracing() {
    use tracing_subscriber::fmt::format::FmtSpan;

    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(build_filter(Some("referral_sync=debug".to_string())))
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_fails_cleanly() {
        init_test_tracing();
        // A subscriber is installed now, so a second global init must error
        // instead of panicking.
        let result = init_tracing(Some("debug".to_string()), None, false);
        assert!(matches!(result, Err(IndexerError::ConfigError { .. })));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
    }
}
