//! Tracing subscriber for the library and the CLI.
//!
//! Console output always; a daily `swingcheck.log` under the user data
//! directory when that directory is writable. Level: `RUST_LOG`, then
//! `SWINGCHECK_LOG_LEVEL`, then `info`.

use std::path::{Path, PathBuf};
use std::sync::{Once, OnceLock};

use tracing::{debug, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "swingcheck.log";
const LEVEL_ENV: &str = "SWINGCHECK_LOG_LEVEL";

static INSTALL: Once = Once::new();
// flushes buffered file output when the process exits
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn resolve_log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("swingcheck")
        .join("logs")
}

/// Non-blocking writer into the rotating log file, or the reason there is none.
fn open_log_file(dir: &Path) -> Result<(NonBlocking, WorkerGuard), std::io::Error> {
    std::fs::create_dir_all(dir)?;
    Ok(tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_PREFIX)))
}

fn level_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = std::env::var(LEVEL_ENV).unwrap_or_else(|_| "info".into());
    EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are no-ops, and so is the
/// first call when another subscriber (e.g. a test harness) already owns
/// the global slot.
pub fn init_logging() {
    INSTALL.call_once(|| {
        let dir = resolve_log_dir();
        let file = open_log_file(&dir);

        let console = fmt::layer().with_timer(UtcTime::rfc_3339());
        let file_layer = file.as_ref().ok().map(|(writer, _)| {
            fmt::layer()
                .with_ansi(false)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer.clone())
        });

        let installed = tracing_subscriber::registry()
            .with(level_filter())
            .with(console)
            .with(file_layer)
            .try_init();
        if installed.is_err() {
            return;
        }

        match file {
            Ok((_, guard)) => {
                FILE_GUARD.set(guard).ok();
                debug!(log_dir = %dir.display(), "swingcheck logging to console and file");
            }
            Err(e) => warn!(log_dir = %dir.display(), "No log file ({}); console only", e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_is_namespaced() {
        let dir = resolve_log_dir();
        assert!(dir.ends_with("swingcheck/logs"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging();
        init_logging();
    }

    #[test]
    fn test_log_file_in_fresh_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("logs");
        assert!(open_log_file(&dir).is_ok());
        assert!(dir.is_dir());
    }
}
