//! Tracing setup shared by the suite and the isolated runner.
//!
//! Both binaries write to the same `log.txt`: the suite truncates it when a
//! run starts and every runner appends, so one file holds the whole run.

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::errors::{HarnessError, Result};

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_FILTER_ENV: &str = "RDH_LOG";

#[derive(Debug, Clone)]
pub struct LogConfig {
    level: String,
    stderr: bool,
    file: Option<LogFile>,
}

#[derive(Debug, Clone)]
struct LogFile {
    path: PathBuf,
    truncate: bool,
}

impl LogConfig {
    /// Start from `RDH_LOG`, falling back to `default_level`.
    pub fn from_env(default_level: &str) -> Self {
        let level = std::env::var(LOG_FILTER_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| default_level.to_string());
        Self {
            level,
            stderr: false,
            file: None,
        }
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    /// Also write to `path`; `truncate` starts a fresh file instead of appending.
    pub fn with_file(mut self, path: impl Into<PathBuf>, truncate: bool) -> Self {
        self.file = Some(LogFile {
            path: path.into(),
            truncate,
        });
        self
    }

    pub fn level(&self) -> &str {
        &self.level
    }
}

/// Keeps the non-blocking file writer alive; dropping it flushes the log.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
///
/// A second call in the same process leaves the first subscriber in place.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = config.stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
    });

    let (file_layer, guard) = match &config.file {
        Some(log_file) => {
            if let Some(parent) = log_file.path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .map_err(HarnessError::io(format!("creating {}", parent.display())))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(!log_file.truncate)
                .truncate(log_file.truncate)
                .open(&log_file.path)
                .map_err(HarnessError::io(format!(
                    "unable to create log file {}",
                    log_file.path.display()
                )))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(LoggingGuards { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_level_and_file() {
        let config = LogConfig::from_env("info")
            .with_level("debug")
            .with_stderr()
            .with_file("/tmp/rdh/log.txt", true);
        assert_eq!(config.level(), "debug");
        assert!(config.stderr);
        let file = config.file.unwrap();
        assert!(file.truncate);
        assert_eq!(file.path, PathBuf::from("/tmp/rdh/log.txt"));
    }

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.txt");
        let config = LogConfig::from_env("info").with_file(&path, true);
        let guards = init_logging(&config).unwrap();
        drop(guards);
        assert!(path.exists());
    }
}
