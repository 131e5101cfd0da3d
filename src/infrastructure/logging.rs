//! Logging infrastructure
//!
//! Two outputs: the `tracing` subscriber (console plus a non-blocking file
//! layer under the log directory) and a plain-text per-run log that records
//! one line per processed URL with its validity checks, followed by the run
//! summary. The run log is what operators diff between imports.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber. Returns the appender guard which must
/// stay alive for the life of the process.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "importer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,html5ever=off,selectors=off"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .try_init()
        .ok(); // a second init in tests is not an error

    Ok(guard)
}

/// Append-only per-run log file, timestamped per run so successive imports
/// never clobber each other.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl RunLog {
    /// Open `logs/<name>_<timestamp>.log` for appending.
    pub fn create(log_dir: &Path, name: &str) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let path = log_dir.join(format!("{name}_{stamp}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open run log {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one line, prefixed with the current UTC timestamp.
    pub fn line(&self, message: &str) {
        let stamped = format!("[{}] {}\n", Utc::now().to_rfc3339(), message);
        if let Ok(mut file) = self.file.lock() {
            // run-log writes are best-effort; the pipeline never fails on them
            let _ = file.write_all(stamped.as_bytes());
        }
    }

    /// Append a multi-line block verbatim (used for the final summary).
    pub fn block(&self, text: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(text.as_bytes());
            let _ = file.write_all(b"\n");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::create(dir.path(), "import_run").unwrap();
        log.line("first");
        log.line("second");
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.contains("first"));
        assert!(contents.contains("second"));
        assert_eq!(contents.lines().count(), 2);
    }
}
