//! Error catalog for the Remote Debug Harness.
//!
//! Every suite-level failure carries a stable code (`RDH-Exxx`) so that calling
//! automation can tell "the environment is broken" apart from "tests failed".
//!
//! # Error Code Ranges
//!
//! | Range      | Category      | Description                                  |
//! |------------|---------------|----------------------------------------------|
//! | E001-E099  | Environment   | Bridge, attached device, debug-server binary |
//! | E100-E199  | Configuration | Config file, env overrides, unknown targets  |
//! | E200-E299  | Deployment    | APK install and native binary push           |
//! | E300-E399  | Device        | Bridge invocation                            |
//! | E400-E499  | Test          | Per-test attach, assertion and timeout       |
//! | E500-E599  | Internal      | Unimplemented paths, host I/O, bad arguments |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code for internal errors and failed internal assertions.
pub const EXIT_INTERNAL: i32 = 1;
/// Exit code for recoverable suite-level exceptions (config, environment, deployment).
pub const EXIT_SUITE: i32 = 2;

/// Error code enumeration covering every harness failure scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Environment Errors (E001-E099)
    // =========================================================================
    /// Bridge binary missing or did not report a version banner
    BridgeUnavailable,
    /// Bridge could not list attached devices
    DeviceListFailed,
    /// No device is attached
    NoDeviceAttached,
    /// More than one device is attached
    MultipleDevicesAttached,
    /// Debug-server binary absent on the device
    DebugServerMissing,
    /// Host debugger could not be started
    DebuggerUnavailable,

    // =========================================================================
    // Configuration Errors (E100-E199)
    // =========================================================================
    /// Configuration file not found
    ConfigNotFound,
    /// Configuration file could not be read or parsed
    ConfigParseError,
    /// Configuration contains invalid values
    ConfigValidationError,
    /// Environment override has an invalid value
    ConfigEnvError,
    /// Test references a target missing from the registry
    UnknownTarget,
    /// Requested test is not in the catalog
    UnknownTest,
    /// Product output tree is not configured
    ProductPathMissing,

    // =========================================================================
    // Deployment Errors (E200-E299)
    // =========================================================================
    /// An APK failed to install
    InstallFailed,
    /// A native binary failed to push
    PushFailed,

    // =========================================================================
    // Device Errors (E300-E399)
    // =========================================================================
    /// The bridge binary could not be spawned
    BridgeSpawnFailed,

    // =========================================================================
    // Test Errors (E400-E499)
    // =========================================================================
    /// Attaching the debugger to the remote process failed
    AttachFailed,
    /// Expected output missing from a debugger command
    AssertionFailed,
    /// The isolated test runner timed out
    TestTimeout,

    // =========================================================================
    // Internal Errors (E500-E599)
    // =========================================================================
    /// Requested behaviour is not implemented
    NotImplemented,
    /// Host filesystem or process I/O failed
    HostIo,
    /// Report or config serialization failed
    SerializationError,
    /// A device operation was given an empty argument
    InvalidArgument,
}

impl ErrorCode {
    /// Returns the numeric error code.
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            // Environment (1-99)
            Self::BridgeUnavailable => 1,
            Self::DeviceListFailed => 2,
            Self::NoDeviceAttached => 3,
            Self::MultipleDevicesAttached => 4,
            Self::DebugServerMissing => 5,
            Self::DebuggerUnavailable => 6,

            // Configuration (100-199)
            Self::ConfigNotFound => 100,
            Self::ConfigParseError => 101,
            Self::ConfigValidationError => 102,
            Self::ConfigEnvError => 103,
            Self::UnknownTarget => 104,
            Self::UnknownTest => 105,
            Self::ProductPathMissing => 106,

            // Deployment (200-299)
            Self::InstallFailed => 200,
            Self::PushFailed => 201,

            // Device (300-399)
            Self::BridgeSpawnFailed => 300,

            // Test (400-499)
            Self::AttachFailed => 400,
            Self::AssertionFailed => 401,
            Self::TestTimeout => 402,

            // Internal (500-599)
            Self::NotImplemented => 500,
            Self::HostIo => 501,
            Self::SerializationError => 502,
            Self::InvalidArgument => 503,
        }
    }

    /// Returns the formatted error code string (e.g., "RDH-E001").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("RDH-E{:03}", self.code_number())
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Environment,
            100..=199 => ErrorCategory::Configuration,
            200..=299 => ErrorCategory::Deployment,
            300..=399 => ErrorCategory::Device,
            400..=499 => ErrorCategory::Test,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns the error message template.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::BridgeUnavailable => "Device bridge is missing or unusable",
            Self::DeviceListFailed => "Unable to list attached devices",
            Self::NoDeviceAttached => "No device or emulator is attached",
            Self::MultipleDevicesAttached => "More than one device is attached",
            Self::DebugServerMissing => "Debug-server binary not found on the device",
            Self::DebuggerUnavailable => "Host debugger could not be started",
            Self::ConfigNotFound => "Configuration file not found",
            Self::ConfigParseError => "Configuration file could not be parsed",
            Self::ConfigValidationError => "Configuration contains invalid values",
            Self::ConfigEnvError => "Environment override has an invalid value",
            Self::UnknownTarget => "Test references an unknown bundle target",
            Self::UnknownTest => "Requested test is not in the catalog",
            Self::ProductPathMissing => "No product output path has been configured",
            Self::InstallFailed => "Test application failed to install",
            Self::PushFailed => "Native test binary failed to push",
            Self::BridgeSpawnFailed => "Bridge binary could not be invoked",
            Self::InvalidArgument => "Device operation received an empty argument",
            Self::AttachFailed => "Debugger failed to attach to the remote process",
            Self::AssertionFailed => "Expected text missing from debugger output",
            Self::TestTimeout => "Test runner exceeded its time budget",
            Self::NotImplemented => "Requested behaviour is not implemented",
            Self::HostIo => "Host I/O operation failed",
            Self::SerializationError => "Serialization failed",
        }
    }

    /// Returns a one-line remediation hint.
    #[must_use]
    pub const fn remediation(&self) -> &'static str {
        match self {
            Self::BridgeUnavailable => "Install platform-tools or set adb_path / RDH_ADB_PATH",
            Self::DeviceListFailed => "Run `adb devices` manually and restart the adb server",
            Self::NoDeviceAttached => "Connect a device or start an emulator",
            Self::MultipleDevicesAttached => "Disconnect all but one device",
            Self::DebugServerMissing => "Push lldb-server to the device and set lldb_server_path",
            Self::DebuggerUnavailable => "Set lldb_path / RDH_LLDB_PATH to a working lldb",
            Self::ConfigNotFound => "Pass an existing file to --config",
            Self::ConfigParseError => "Check the TOML syntax of the config file",
            Self::ConfigValidationError => "Fix the reported configuration values",
            Self::ConfigEnvError => "Unset or correct the reported RDH_* variables",
            Self::UnknownTarget => "Add the target to the bundle registry",
            Self::UnknownTest => "Run `rdh list` to see the available tests",
            Self::ProductPathMissing => "Run `lunch` or set product_path / RDH_PRODUCT_OUT",
            Self::InstallFailed => "Rebuild the APK and check the device has free space",
            Self::PushFailed => "Rebuild the binary and check the device is writable",
            Self::BridgeSpawnFailed => "Check that adb_path points at an executable",
            Self::InvalidArgument => "Report this as a harness bug",
            Self::AttachFailed => "Check lldb-server is running and the port is forwarded",
            Self::AssertionFailed => "Inspect the test transcript in log.txt",
            Self::TestTimeout => "Inspect the device for a wedged process",
            Self::NotImplemented => "Use an APK target instead",
            Self::HostIo => "Check permissions on the log directory",
            Self::SerializationError => "Report this as a harness bug",
        }
    }

    /// Returns all error codes for iteration.
    #[must_use]
    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::BridgeUnavailable,
            Self::DeviceListFailed,
            Self::NoDeviceAttached,
            Self::MultipleDevicesAttached,
            Self::DebugServerMissing,
            Self::DebuggerUnavailable,
            Self::ConfigNotFound,
            Self::ConfigParseError,
            Self::ConfigValidationError,
            Self::ConfigEnvError,
            Self::UnknownTarget,
            Self::UnknownTest,
            Self::ProductPathMissing,
            Self::InstallFailed,
            Self::PushFailed,
            Self::BridgeSpawnFailed,
            Self::AttachFailed,
            Self::AssertionFailed,
            Self::TestTimeout,
            Self::NotImplemented,
            Self::HostIo,
            Self::SerializationError,
            Self::InvalidArgument,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Bridge and device availability (E001-E099)
    Environment,
    /// Config file and registry consistency (E100-E199)
    Configuration,
    /// Artifact deployment (E200-E299)
    Deployment,
    /// Bridge invocation (E300-E399)
    Device,
    /// Scoped to a single test (E400-E499)
    Test,
    /// Internal/unexpected errors (E500-E599)
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable name for the category.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Environment => "Environment",
            Self::Configuration => "Configuration",
            Self::Deployment => "Deployment",
            Self::Device => "Device",
            Self::Test => "Test",
            Self::Internal => "Internal",
        }
    }

    /// Process exit code used when an error of this category aborts a run.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Environment | Self::Configuration | Self::Deployment | Self::Device => {
                EXIT_SUITE
            }
            Self::Test | Self::Internal => EXIT_INTERNAL,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numbers_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::all() {
            let num = code.code_number();
            assert!(
                seen.insert(num),
                "Duplicate error code number: {} for {:?}",
                num,
                code
            );
        }
    }

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::BridgeUnavailable.code_string(), "RDH-E001");
        assert_eq!(ErrorCode::ConfigNotFound.code_string(), "RDH-E100");
        assert_eq!(ErrorCode::InstallFailed.code_string(), "RDH-E200");
        assert_eq!(ErrorCode::BridgeSpawnFailed.code_string(), "RDH-E300");
        assert_eq!(ErrorCode::AttachFailed.code_string(), "RDH-E400");
        assert_eq!(ErrorCode::NotImplemented.code_string(), "RDH-E500");
    }

    #[test]
    fn test_suite_level_categories_exit_with_two() {
        for code in [
            ErrorCode::MultipleDevicesAttached,
            ErrorCode::UnknownTarget,
            ErrorCode::PushFailed,
            ErrorCode::BridgeSpawnFailed,
        ] {
            assert_eq!(code.category().exit_code(), EXIT_SUITE, "{code:?}");
        }
        assert_eq!(ErrorCode::NotImplemented.category().exit_code(), EXIT_INTERNAL);
        assert_eq!(ErrorCode::InvalidArgument.category(), ErrorCategory::Internal);
    }
}
