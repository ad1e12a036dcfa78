//! Tracing subscriber setup.
//!
//! Diagnostics go to stderr so they never interleave with the operator-facing
//! output on stdout. When `[logging] dir` is configured, a plain-text copy is
//! also written to `<dir>/waypoint.log` through a non-blocking writer.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

/// Environment variable holding a tracing filter directive.
pub const ENV_LOG: &str = "WAYPOINT_LOG";

const LOG_FILE_PREFIX: &str = "waypoint";
const LOG_FILE_SUFFIX: &str = "log";

/// `WAYPOINT_LOG`, then `RUST_LOG`, then `fallback`.
fn make_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the process lifetime; dropping it flushes
/// the file writer. Calling this twice is harmless.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_level = if verbose { "debug" } else { "warn" };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(make_filter(stderr_level));

    let (file_layer, guard) = match log_dir.and_then(file_appender) {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(make_filter("info"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    guard
}

fn file_appender(dir: &Path) -> Option<RollingFileAppender> {
    let built = std::fs::create_dir_all(dir).map_err(|e| e.to_string()).and_then(|()| {
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix(LOG_FILE_SUFFIX)
            .build(dir)
            .map_err(|e| e.to_string())
    });
    match built {
        Ok(appender) => Some(appender),
        Err(e) => {
            // The subscriber is not installed yet, so this cannot go through tracing.
            eprintln!("waypoint: file logging disabled, cannot use {}: {}", dir.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_appender_creates_log_directory() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        assert!(file_appender(&log_dir).is_some());
        assert!(log_dir.is_dir());
    }

    #[test]
    fn unusable_log_directory_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        assert!(file_appender(&blocker.join("logs")).is_none());
    }
}
