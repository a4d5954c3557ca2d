//! Debugger backend driving the host `lldb` binary over its command line.
//!
//! Each session is one `lldb` child with stdin and a merged stdout/stderr
//! pipe. The debugger is switched to synchronous mode before anything else,
//! so `process continue` and `process attach` only return once the process
//! has stopped. After each command a script marker is sent and output is read
//! until the marker line comes back; the marker prints that one line and
//! nothing more.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::{BindingError, CommandReturn, DebuggerBackend, DebuggerSession};
use crate::errors::{ErrorCode, HarnessError, Result};

const PROMPT: &str = "(lldb)";
const ERROR_PREFIX: &str = "error:";
const SYNC_MODE: &str = "script lldb.debugger.SetAsync(False)";
const ASYNC_QUERY: &str = "script print(lldb.debugger.GetAsync())";
const NULL_TARGET: &str = "script print(lldb.debugger.CreateTarget(None).IsValid())";
const QUIT_GRACE: Duration = Duration::from_secs(5);

/// Backend that spawns one `lldb` process per session.
#[derive(Debug, Clone)]
pub struct LldbDriver {
    program: PathBuf,
    python_path: Option<String>,
}

impl LldbDriver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            python_path: None,
        }
    }

    /// Export `PYTHONPATH` to every session.
    pub fn with_python_path(mut self, path: Option<String>) -> Self {
        self.python_path = path;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl DebuggerBackend for LldbDriver {
    type Session = LldbSession;

    fn initialize(&self) -> Result<()> {
        let found = if self.program.components().count() > 1 {
            self.program.exists()
        } else {
            which::which(&self.program).is_ok()
        };
        if !found {
            return Err(HarnessError::environment(
                ErrorCode::DebuggerUnavailable,
                format!("unable to find debugger {}", self.program.display()),
            ));
        }
        Ok(())
    }

    fn terminate(&self) {}

    fn create_session(&self) -> Result<LldbSession> {
        // `sh` merges stderr into stdout so error lines stay in order with
        // regular output.
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(r#"exec "$0" --no-lldbinit --no-use-colors 2>&1"#)
            .arg(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(path) = &self.python_path {
            cmd.env("PYTHONPATH", path);
        }
        let mut child = cmd.spawn().map_err(|err| {
            HarnessError::environment(
                ErrorCode::DebuggerUnavailable,
                format!("unable to start {}: {err}", self.program.display()),
            )
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(HarnessError::environment(
                ErrorCode::DebuggerUnavailable,
                "debugger pipes were not created",
            ));
        };

        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut session = LldbSession {
            child,
            stdin,
            lines,
            sync_counter: 0,
        };
        if let Err(err) = session.enter_sync_mode() {
            session.destroy();
            return Err(HarnessError::environment(
                ErrorCode::DebuggerUnavailable,
                format!("unable to make the debugger synchronous: {err}"),
            ));
        }
        let setup = session.handle_command("settings set auto-confirm true");
        if !setup.succeeded {
            warn!("unable to enable auto-confirm: {}", setup.error);
        }
        Ok(session)
    }
}

/// A live `lldb` child process.
pub struct LldbSession {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    sync_counter: u64,
}

impl LldbSession {
    fn run_checked(&mut self, command: &str) -> std::result::Result<String, BindingError> {
        let ret = self.handle_command(command);
        if ret.succeeded {
            Ok(ret.output)
        } else {
            Err(BindingError(ret.error))
        }
    }

    fn enter_sync_mode(&mut self) -> std::result::Result<(), BindingError> {
        self.run_checked(SYNC_MODE)?;
        let mode = self.run_checked(ASYNC_QUERY)?;
        if mode.trim() != "False" {
            return Err(BindingError(format!("debugger reports async = {}", mode.trim())));
        }
        Ok(())
    }

    fn send(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()
    }
}

impl DebuggerSession for LldbSession {
    fn select_platform(&mut self, kind: &str) -> std::result::Result<(), BindingError> {
        self.run_checked(&format!("platform select {kind}")).map(drop)
    }

    fn connect_platform(&mut self, url: &str) -> std::result::Result<(), BindingError> {
        self.run_checked(&format!("platform connect {url}")).map(drop)
    }

    fn create_null_target(&mut self) -> std::result::Result<(), BindingError> {
        let valid = self.run_checked(NULL_TARGET)?;
        if valid.trim() != "True" {
            return Err(BindingError("unable to create an empty target".to_string()));
        }
        Ok(())
    }

    fn attach_to_pid(&mut self, pid: u32) -> std::result::Result<(), BindingError> {
        self.run_checked(&format!("process attach --pid {pid}")).map(drop)
    }

    fn interpreter_ready(&mut self) -> bool {
        let ret = self.handle_command("help");
        ret.succeeded && !ret.output.trim().is_empty()
    }

    fn handle_command(&mut self, command: &str) -> CommandReturn {
        self.sync_counter += 1;
        let marker = format!("rdh-sync-{}", self.sync_counter);
        trace!(command, "lldb <-");

        if let Err(err) = self
            .send(command)
            .and_then(|()| self.send(&format!("script print(\"{marker}\")")))
        {
            return CommandReturn::failure(format!("unable to write to debugger: {err}"));
        }

        let mut ret = collect_until(&self.lines, &marker);
        if !ret.reached_marker {
            ret.error.push_str("debugger exited before the command completed");
        }
        debug!(command, succeeded = ret.succeeded(), "lldb command");
        CommandReturn {
            succeeded: ret.succeeded(),
            output: ret.output,
            error: ret.error,
        }
    }

    fn disconnect_platform(&mut self) -> std::result::Result<(), BindingError> {
        self.run_checked("platform disconnect").map(drop)
    }

    fn destroy(&mut self) {
        let _ = self.send("quit");
        let deadline = Instant::now() + QUIT_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
                _ => break,
            }
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct Collected {
    output: String,
    error: String,
    reached_marker: bool,
}

impl Collected {
    fn succeeded(&self) -> bool {
        self.reached_marker && self.error.is_empty()
    }
}

/// Read lines up to the printed marker, splitting error lines from output.
fn collect_until(lines: &Receiver<String>, marker: &str) -> Collected {
    let mut collected = Collected {
        output: String::new(),
        error: String::new(),
        reached_marker: false,
    };
    while let Ok(line) = lines.recv() {
        if line.trim_start_matches(PROMPT).trim() == marker {
            collected.reached_marker = true;
            break;
        }
        // Command echoes, including the marker command itself.
        if line.starts_with(PROMPT) || line.contains(marker) {
            continue;
        }
        let target = if line.starts_with(ERROR_PREFIX) {
            &mut collected.error
        } else {
            &mut collected.output
        };
        target.push_str(&line);
        target.push('\n');
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(lines: &[&str]) -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        for line in lines {
            tx.send((*line).to_string()).unwrap();
        }
        rx
    }

    #[test]
    fn test_collect_splits_errors_and_stops_at_marker() {
        let rx = feed(&[
            "(lldb) breakpoint list",
            "Current breakpoints:",
            "1: name = 'simple_kernel', locations = 1, resolved = 1",
            "(lldb) script print(\"rdh-sync-3\")",
            "rdh-sync-3",
            "late line",
        ]);
        let got = collect_until(&rx, "rdh-sync-3");
        assert!(got.reached_marker);
        assert!(got.succeeded());
        assert_eq!(
            got.output,
            "Current breakpoints:\n1: name = 'simple_kernel', locations = 1, resolved = 1\n"
        );
        assert_eq!(rx.recv().unwrap(), "late line");
    }

    #[test]
    fn test_collect_reports_error_lines() {
        let rx = feed(&["error: invalid process", "(lldb) rdh-sync-1"]);
        let got = collect_until(&rx, "rdh-sync-1");
        assert!(!got.succeeded());
        assert_eq!(got.error, "error: invalid process\n");
        assert!(got.output.is_empty());
    }

    #[test]
    fn test_collect_without_marker_is_failure() {
        let rx = feed(&["Process 42 exited"]);
        let got = collect_until(&rx, "rdh-sync-9");
        assert!(!got.reached_marker);
        assert!(!got.succeeded());
    }

    /// Stand-in `lldb` that stops the process inside `process continue` only
    /// once synchronous mode has been requested. Every input line is appended
    /// to `journal.txt` next to the script.
    #[cfg(unix)]
    const FAKE_LLDB: &str = r#"#!/bin/sh
dir=$(dirname "$0")
async=True
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$dir/journal.txt"
  case "$line" in
    "script lldb.debugger.SetAsync(False)") async=@AFTER@ ;;
    "script print(lldb.debugger.GetAsync())") echo "$async" ;;
    "script print(lldb.debugger.CreateTarget(None).IsValid())") echo True ;;
    "script print(\"rdh-sync-"*) m=${line#*\"}; echo "${m%\"*}" ;;
    "process continue")
      echo "Process 4321 resuming"
      if [ "$async" = False ]; then
        echo "Process 4321 stopped"
        echo "* thread #1, stop reason = breakpoint 1.1"
      fi ;;
    quit) exit 0 ;;
    *) echo "ran $line" ;;
  esac
done
"#;

    #[cfg(unix)]
    fn fake_lldb(dir: &Path, honours_sync: bool) -> PathBuf {
        let script = dir.join("lldb");
        let after = if honours_sync { "False" } else { "True" };
        std::fs::write(&script, FAKE_LLDB.replace("@AFTER@", after)).unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();
        script
    }

    #[cfg(unix)]
    #[test]
    fn test_session_is_synchronous_and_keeps_output_per_command() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LldbDriver::new(fake_lldb(dir.path(), true));
        driver.initialize().unwrap();

        let mut session = driver.create_session().unwrap();
        session.create_null_target().unwrap();
        let resumed = session.handle_command("process continue");
        assert!(resumed.succeeded);
        assert!(resumed.output.contains("stop reason = breakpoint"));
        let bt = session.handle_command("bt");
        assert_eq!(bt.output, "ran bt\n");
        session.destroy();

        let journal = std::fs::read_to_string(dir.path().join("journal.txt")).unwrap();
        let issued: Vec<&str> = journal
            .lines()
            .filter(|line| !line.contains("rdh-sync-"))
            .collect();
        assert_eq!(
            issued,
            [
                SYNC_MODE,
                ASYNC_QUERY,
                "settings set auto-confirm true",
                NULL_TARGET,
                "process continue",
                "bt",
                "quit",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_session_refused_when_debugger_stays_asynchronous() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LldbDriver::new(fake_lldb(dir.path(), false));
        let Err(err) = driver.create_session() else {
            panic!("an asynchronous debugger must not yield a session");
        };
        assert_eq!(err.code(), ErrorCode::DebuggerUnavailable);
    }

    #[test]
    fn test_missing_program_fails_initialize() {
        let err = LldbDriver::new("/nonexistent/bin/lldb").initialize().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DebuggerUnavailable);
    }
}
