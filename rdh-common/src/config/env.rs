//! Environment variable overrides with type safety.
//!
//! Provides a parser for `RDH_*` variables that collects every invalid value
//! so all problems are reported at once instead of one per run.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Variable is set but empty.
    #[error("Empty value for {var}")]
    Empty { var: String },
}

/// Type-safe environment variable parser.
///
/// Every getter returns `None` when the variable is unset, so callers only
/// override what the user actually exported.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the RDH_ prefix.
    pub fn new() -> Self {
        Self::with_prefix("RDH_")
    }

    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get a non-empty string override.
    pub fn get_string(&mut self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        let value = env::var(&var_name).ok()?;
        if value.trim().is_empty() {
            self.errors.push(EnvError::Empty { var: var_name });
            return None;
        }
        Some(value)
    }

    /// Get a path override with `~/` expansion.
    pub fn get_path(&mut self, name: &str) -> Option<PathBuf> {
        let value = self.get_string(name)?;
        if let Some(stripped) = value.strip_prefix("~/")
            && let Ok(home) = env::var("HOME")
        {
            return Some(PathBuf::from(home).join(stripped));
        }
        Some(PathBuf::from(value))
    }

    /// Get a port override (1..=65535).
    pub fn get_port(&mut self, name: &str) -> Option<u16> {
        self.get_u64_range(name, 1, u64::from(u16::MAX))
            .and_then(|n| u16::try_from(n).ok())
    }

    /// Get a u64 override with range validation.
    pub fn get_u64_range(&mut self, name: &str, min: u64, max: u64) -> Option<u64> {
        let var_name = self.var_name(name);
        let value = env::var(&var_name).ok()?;
        match value.trim().parse::<u64>() {
            Ok(n) if n >= min && n <= max => Some(n),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var_name,
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                None
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "unsigned integer".to_string(),
                    value,
                });
                None
            }
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::config::env_test_lock;

    // Each test uses its own prefix so parallel tests never collide.
    fn set(key: &str, value: &str) {
        // SAFETY: Tests are serialized via env_test_lock
        unsafe { env::set_var(key, value) };
    }

    fn unset(key: &str) {
        // SAFETY: Tests are serialized via env_test_lock
        unsafe { env::remove_var(key) };
    }

    #[test]
    fn test_unset_variables_yield_none_without_errors() {
        let _lock = env_test_lock();
        unset("RDHT1_PORT");
        let mut parser = EnvParser::with_prefix("RDHT1_");
        assert_eq!(parser.get_port("PORT"), None);
        assert!(!parser.has_errors());
    }

    #[test]
    fn test_port_parses_and_validates_range() {
        let _lock = env_test_lock();
        set("RDHT2_GOOD", "5039");
        set("RDHT2_ZERO", "0");
        set("RDHT2_HUGE", "70000");
        set("RDHT2_WORD", "abc");
        let mut parser = EnvParser::with_prefix("RDHT2_");
        assert_eq!(parser.get_port("GOOD"), Some(5039));
        assert_eq!(parser.get_port("ZERO"), None);
        assert_eq!(parser.get_port("HUGE"), None);
        assert_eq!(parser.get_port("WORD"), None);
        assert_eq!(parser.errors().len(), 3);
        assert!(matches!(parser.errors()[2], EnvError::InvalidValue { .. }));
        for key in ["RDHT2_GOOD", "RDHT2_ZERO", "RDHT2_HUGE", "RDHT2_WORD"] {
            unset(key);
        }
    }

    #[test]
    fn test_empty_string_is_reported() {
        let _lock = env_test_lock();
        set("RDHT3_ADB_PATH", "  ");
        let mut parser = EnvParser::with_prefix("RDHT3_");
        assert_eq!(parser.get_string("ADB_PATH"), None);
        let errors = parser.take_errors();
        assert_eq!(
            errors,
            vec![EnvError::Empty {
                var: "RDHT3_ADB_PATH".to_string()
            }]
        );
        assert!(!parser.has_errors());
        unset("RDHT3_ADB_PATH");
    }

    #[test]
    fn test_path_expands_home() {
        let _lock = env_test_lock();
        set("RDHT4_LOG_DIR", "~/rdh-logs");
        let mut parser = EnvParser::with_prefix("RDHT4_");
        let path = parser.get_path("LOG_DIR").unwrap();
        if let Ok(home) = env::var("HOME") {
            assert_eq!(path, PathBuf::from(home).join("rdh-logs"));
        }
        unset("RDHT4_LOG_DIR");
    }
}
