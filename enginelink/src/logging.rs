//! Tracing setup for the command line.
//!
//! Logs go to stderr by default so that stdout only carries engine output.
//! With a log directory they go to a daily rolling file instead.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "enginelink";

/// Install the global subscriber. Keep the returned guard alive for as long
/// as file logs should be flushed.
pub fn init(log_dir: Option<&Path>) -> std::io::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match log_dir {
        Some(dir) => {
            let (writer, guard) = file_writer(dir)?;
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true),
                )
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .init();
            Ok(None)
        }
    }
}

/// Daily rolling writer under `dir`, creating the directory if needed.
pub fn file_writer(dir: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_writer_creates_log_dir() {
        let tempdir = tempfile::tempdir().expect("failed to create temp dir");
        let log_dir = tempdir.path().join("nested").join("logs");

        assert!(!log_dir.exists());
        let _writer = file_writer(&log_dir).expect("failed to create log writer");
        assert!(log_dir.is_dir());
    }
}
