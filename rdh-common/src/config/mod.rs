//! Harness configuration.
//!
//! Settings come from (lowest to highest precedence) built-in defaults, an
//! optional TOML file and `RDH_*` environment overrides. The suite writes the
//! merged result next to its log so every isolated runner reads exactly the
//! same values.

pub mod env;

pub use env::{EnvError, EnvParser};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::errors::{ErrorCode, HarnessError, Result};

/// Environment variable set by the platform build `lunch` step.
pub const PRODUCT_OUT_ENV: &str = "ANDROID_PRODUCT_OUT";

/// File name of the merged configuration handed to isolated runners.
pub const EFFECTIVE_CONFIG_FILE: &str = "rdh-effective-config.toml";

/// Name of the shared suite log inside `log_dir`.
pub const LOG_FILE_NAME: &str = "log.txt";

/// Default per-test time budget (15 minutes).
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 60 * 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Host path (or PATH-resolvable name) of the device bridge.
    pub adb_path: PathBuf,
    /// Host side of the forwarded debug-server port.
    pub host_port: u16,
    /// Device side of the forwarded debug-server port.
    pub device_port: u16,
    /// Path of the debug-server binary on the device.
    pub lldb_server_path: String,
    /// Product output tree holding the installable artifacts.
    pub product_path: Option<PathBuf>,
    /// Directory receiving `log.txt`, the results report and the effective config.
    pub log_dir: PathBuf,
    /// Host debugger binary.
    pub lldb_path: Option<PathBuf>,
    /// Watchdog budget for one isolated test, in seconds.
    pub test_timeout_secs: u64,
    /// Device command used to list processes.
    pub process_list_command: String,
    /// Debug-server log channels (empty disables server logging).
    pub server_log_channels: Vec<String>,
    /// Device path of the debug-server log.
    pub server_log_path: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            host_port: 1234,
            device_port: 1234,
            lldb_server_path: "/data/lldb-server".to_string(),
            product_path: None,
            log_dir: PathBuf::from("."),
            lldb_path: Some(PathBuf::from("lldb")),
            test_timeout_secs: DEFAULT_TEST_TIMEOUT_SECS,
            process_list_command: "ps".to_string(),
            server_log_channels: Vec::new(),
            server_log_path: "/data/lldblog.txt".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load, merge and validate the configuration.
    ///
    /// `None` means "use the defaults", mirroring a run without `--config`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let mut parser = EnvParser::new();
        config.apply_env(&mut parser);
        if parser.has_errors() {
            return Err(HarnessError::Env(parser.take_errors()));
        }

        if config.product_path.is_none() {
            config.product_path = std::env::var_os(PRODUCT_OUT_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from);
        }

        config.validate()?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Read a TOML config file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                HarnessError::configuration(
                    ErrorCode::ConfigNotFound,
                    format!("unable to load config file {}", path.display()),
                )
            } else {
                HarnessError::configuration(
                    ErrorCode::ConfigParseError,
                    format!("unable to read config file {}: {err}", path.display()),
                )
            }
        })?;
        Self::from_toml_str(&contents).map_err(|err| match err {
            HarnessError::Configuration { code, message } => HarnessError::Configuration {
                code,
                message: format!("{}: {message}", path.display()),
            },
            other => other,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|err| {
            HarnessError::configuration(ErrorCode::ConfigParseError, err.to_string())
        })
    }

    /// Apply `RDH_*` overrides; parse problems accumulate in `parser`.
    pub fn apply_env(&mut self, parser: &mut EnvParser) {
        if let Some(path) = parser.get_path("ADB_PATH") {
            self.adb_path = path;
        }
        if let Some(port) = parser.get_port("HOST_PORT") {
            self.host_port = port;
        }
        if let Some(port) = parser.get_port("DEVICE_PORT") {
            self.device_port = port;
        }
        if let Some(path) = parser.get_string("LLDB_SERVER_PATH") {
            self.lldb_server_path = path;
        }
        if let Some(path) = parser.get_path("PRODUCT_OUT") {
            self.product_path = Some(path);
        }
        if let Some(path) = parser.get_path("LOG_DIR") {
            self.log_dir = path;
        }
        if let Some(path) = parser.get_path("LLDB_PATH") {
            self.lldb_path = Some(path);
        }
        if let Some(secs) = parser.get_u64_range("TEST_TIMEOUT_SECS", 1, 24 * 60 * 60) {
            self.test_timeout_secs = secs;
        }
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.adb_path.as_os_str().is_empty() {
            problems.push("adb_path must not be empty".to_string());
        }
        if self.host_port == 0 || self.device_port == 0 {
            problems.push("host_port and device_port must be non-zero".to_string());
        }
        if self.lldb_server_path.trim().is_empty() {
            problems.push("lldb_server_path must not be empty".to_string());
        }
        if self.test_timeout_secs == 0 {
            problems.push("test_timeout_secs must be at least 1".to_string());
        }
        if self.process_list_command.trim().is_empty() {
            problems.push("process_list_command must not be empty".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::configuration(
                ErrorCode::ConfigValidationError,
                problems.join("; "),
            ))
        }
    }

    #[must_use]
    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    #[must_use]
    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }

    /// Serialize the merged configuration into `log_dir` and return its path.
    pub fn write_effective(&self) -> Result<PathBuf> {
        let rendered = toml::to_string(self).map_err(|err| HarnessError::Serialization {
            what: "effective configuration",
            message: err.to_string(),
        })?;
        std::fs::create_dir_all(&self.log_dir)
            .map_err(HarnessError::io(format!("creating {}", self.log_dir.display())))?;
        let path = self.log_dir.join(EFFECTIVE_CONFIG_FILE);
        std::fs::write(&path, rendered)
            .map_err(HarnessError::io(format!("writing {}", path.display())))?;
        Ok(path)
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = HarnessConfig::from_toml_str(
            r#"
lldb_server_path = "/data/local/tmp/lldb-server"
host_port = 5039
"#,
        )
        .unwrap();
        assert_eq!(config.lldb_server_path, "/data/local/tmp/lldb-server");
        assert_eq!(config.host_port, 5039);
        assert_eq!(config.device_port, 1234);
        assert_eq!(config.adb_path, PathBuf::from("adb"));
        assert_eq!(config.test_timeout(), Duration::from_secs(900));
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let err = HarnessConfig::from_toml_str("adb = \"adb\"").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigParseError);
    }

    #[test]
    fn test_missing_file_is_config_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = HarnessConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigNotFound);
        assert_eq!(err.exit_code(), crate::errors::EXIT_SUITE);
    }

    #[test]
    fn test_validate_rejects_zero_port_and_timeout() {
        let config = HarnessConfig {
            host_port: 0,
            test_timeout_secs: 0,
            ..HarnessConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigValidationError);
        let message = err.to_string();
        assert!(message.contains("non-zero"));
        assert!(message.contains("test_timeout_secs"));
    }

    #[test]
    fn test_effective_config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig {
            log_dir: dir.path().to_path_buf(),
            product_path: Some(PathBuf::from("/out/target/product/generic")),
            server_log_channels: vec!["lldb process".to_string()],
            ..HarnessConfig::default()
        };
        let path = config.write_effective().unwrap();
        assert_eq!(path, dir.path().join(EFFECTIVE_CONFIG_FILE));
        let reloaded = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
