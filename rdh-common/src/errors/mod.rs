//! Error types for the Remote Debug Harness.
//!
//! `HarnessError` carries every suite-level failure. Each variant resolves to a
//! catalog [`ErrorCode`], which in turn decides the process exit code. Errors
//! scoped to a single test (attach failures, missing output, timeouts) have
//! their own types and are converted into a test outcome at the runner
//! boundary instead of propagating.

pub mod catalog;

pub use catalog::{EXIT_INTERNAL, EXIT_SUITE, ErrorCategory, ErrorCode};

use std::path::PathBuf;
use thiserror::Error;

use crate::config::EnvError;

/// Result alias used across the harness.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Suite-level harness error.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Bridge, device or debug-server preconditions are not met.
    #[error("{message}")]
    Environment { code: ErrorCode, message: String },

    /// The configuration or the static registries are inconsistent.
    #[error("{message}")]
    Configuration { code: ErrorCode, message: String },

    /// One or more `RDH_*` overrides failed to parse.
    #[error("invalid environment overrides: {}", join_env_errors(.0))]
    Env(Vec<EnvError>),

    /// A test references a target that is in neither registry.
    #[error("unknown bundle target '{0}' (add it to the bundle registry)")]
    UnknownTarget(String),

    /// The bridge binary itself could not be spawned.
    #[error("unable to invoke bridge {program}: {source}")]
    DeviceCommand {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An APK did not report a successful install.
    #[error("unable to install app {app}")]
    Install { app: String, output: String },

    /// A native binary did not transfer.
    #[error("unable to push binary {binary}")]
    Push { binary: String, output: String },

    /// A device operation was handed an empty argument.
    #[error("{operation}: {argument} must not be empty")]
    InvalidArgument {
        operation: &'static str,
        argument: &'static str,
    },

    /// An unsupported path was taken.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Host-side I/O failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serializing a report or config failed.
    #[error("unable to serialize {what}: {message}")]
    Serialization { what: &'static str, message: String },
}

impl HarnessError {
    pub fn environment(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Environment {
            code,
            message: message.into(),
        }
    }

    pub fn configuration(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Configuration {
            code,
            message: message.into(),
        }
    }

    /// Build a closure that wraps an `io::Error` with context, for `map_err`.
    pub fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }

    /// Catalog code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Environment { code, .. } | Self::Configuration { code, .. } => *code,
            Self::Env(_) => ErrorCode::ConfigEnvError,
            Self::UnknownTarget(_) => ErrorCode::UnknownTarget,
            Self::DeviceCommand { .. } => ErrorCode::BridgeSpawnFailed,
            Self::Install { .. } => ErrorCode::InstallFailed,
            Self::Push { .. } => ErrorCode::PushFailed,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::NotImplemented(_) => ErrorCode::NotImplemented,
            Self::Io { .. } => ErrorCode::HostIo,
            Self::Serialization { .. } => ErrorCode::SerializationError,
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Exit code a binary should use when this error aborts the run.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    /// Single-line diagnostic including the catalog code and hint.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let code = self.code();
        format!("[{}] {} ({})", code.code_string(), self, code.remediation())
    }
}

fn join_env_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_target_is_configuration_error() {
        let err = HarnessError::UnknownTarget("Nope".to_string());
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.exit_code(), EXIT_SUITE);
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn test_not_implemented_is_internal() {
        let err = HarnessError::NotImplemented("native launch".to_string());
        assert_eq!(err.exit_code(), EXIT_INTERNAL);
    }

    #[test]
    fn test_diagnostic_includes_code_and_hint() {
        let err = HarnessError::environment(ErrorCode::MultipleDevicesAttached, "2 devices");
        let diag = err.diagnostic();
        assert!(diag.starts_with("[RDH-E004] 2 devices"));
        assert!(diag.contains("Disconnect all but one device"));
    }

    #[test]
    fn test_io_helper_keeps_context() {
        let err = HarnessError::io("writing results")(std::io::Error::other("disk full"));
        assert_eq!(err.to_string(), "writing results: disk full");
        assert_eq!(err.code(), ErrorCode::HostIo);
    }
}
