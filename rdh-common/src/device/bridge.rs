//! Device-bridge command execution.
//!
//! The bridge is the only path to the device. [`Bridge`] is the seam the
//! controller talks through; [`AdbBridge`] spawns the real host binary and the
//! mock module provides a scripted stand-in for tests.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, trace, warn};

use crate::errors::{ErrorCode, HarnessError, Result};

/// Bridge shim contract.
///
/// `run` blocks and returns stdout followed by stderr as one string. The
/// remote exit status is not surfaced; callers interpret the text. Only a
/// failure to spawn the bridge binary itself is an error.
pub trait Bridge: Send + Sync {
    /// Execute synchronously and return combined output.
    fn run(&self, args: &[&str]) -> Result<String>;

    /// Execute without waiting for completion.
    fn spawn(&self, args: &[&str]) -> Result<()>;

    /// Host binary used for display and diagnostics.
    fn program(&self) -> &Path;
}

impl<B: Bridge + ?Sized> Bridge for &B {
    fn run(&self, args: &[&str]) -> Result<String> {
        (**self).run(args)
    }

    fn spawn(&self, args: &[&str]) -> Result<()> {
        (**self).spawn(args)
    }

    fn program(&self) -> &Path {
        (**self).program()
    }
}

/// Bridge backed by the `adb` host binary.
#[derive(Debug, Clone)]
pub struct AdbBridge {
    program: PathBuf,
}

impl AdbBridge {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Resolve a bare program name through `PATH`.
    ///
    /// Paths containing a separator are taken as-is; spawning them later will
    /// report a `DeviceCommand` error if they are wrong.
    pub fn resolve(program: &Path) -> Result<Self> {
        if program.components().count() > 1 {
            return Ok(Self::new(program));
        }
        which::which(program).map(Self::new).map_err(|err| {
            HarnessError::environment(
                ErrorCode::BridgeUnavailable,
                format!("unable to locate {} on PATH: {err}", program.display()),
            )
        })
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).stdin(Stdio::null());
        cmd
    }

    fn spawn_error(&self) -> impl FnOnce(std::io::Error) -> HarnessError + '_ {
        move |source| HarnessError::DeviceCommand {
            program: self.program.clone(),
            source,
        }
    }
}

impl Bridge for AdbBridge {
    fn run(&self, args: &[&str]) -> Result<String> {
        debug!("{} {}", self.program.display(), args.join(" "));
        let output = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(self.spawn_error())?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        trace!(output = %combined, "bridge output");
        Ok(combined)
    }

    fn spawn(&self, args: &[&str]) -> Result<()> {
        debug!("{} {} &", self.program.display(), args.join(" "));
        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(self.spawn_error())?;

        // Drain and reap in the background so the child never blocks on a
        // full pipe or lingers as a zombie.
        let label = args.join(" ");
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Some(mut stdout) = child.stdout.take() {
                let _ = stdout.read_to_end(&mut buffer);
            }
            match child.wait() {
                Ok(status) => trace!(%label, %status, "async bridge command exited"),
                Err(err) => warn!(%label, "unable to reap async bridge command: {err}"),
            }
            if !buffer.is_empty() {
                trace!(%label, output = %String::from_utf8_lossy(&buffer), "async bridge output");
            }
        });
        Ok(())
    }

    fn program(&self) -> &Path {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_device_command_error() {
        let bridge = AdbBridge::new("/nonexistent/rdh/adb");
        let err = bridge.run(&["version"]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BridgeSpawnFailed);
        assert!(err.to_string().contains("/nonexistent/rdh/adb"));
    }

    #[test]
    fn test_explicit_path_is_not_resolved() {
        let bridge = AdbBridge::resolve(Path::new("/opt/platform-tools/adb")).unwrap();
        assert_eq!(bridge.program(), Path::new("/opt/platform-tools/adb"));
    }

    #[test]
    fn test_unknown_bare_name_is_environment_error() {
        let err = AdbBridge::resolve(Path::new("rdh-no-such-bridge-binary")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BridgeUnavailable);
    }

    #[cfg(unix)]
    #[test]
    fn test_output_combines_stdout_then_stderr() {
        let bridge = AdbBridge::new("sh");
        let output = bridge
            .run(&["-c", "echo out; echo err 1>&2; exit 3"])
            .unwrap();
        assert_eq!(output, "out\nerr\n");
    }
}
