//! Logging Infrastructure

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize the logger with optional file output
///
/// `RUST_LOG` wins over `log_level` when set. Logs go to stderr, since
/// stdout carries job results. If `log_dir` exists, output goes to a daily
/// rolling file there instead; keep the returned guard alive until exit so
/// buffered lines are flushed.
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) -> Option<WorkerGuard> {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if log_path.is_dir() {
            let file_appender = tracing_appender::rolling::daily(log_path, "print-host");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            subscriber.with_ansi(false).with_writer(writer).init();
            return Some(guard);
        }
    }

    subscriber.with_writer(std::io::stderr).init();
    None
}
