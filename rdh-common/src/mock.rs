//! Scripted stand-ins for the device bridge, the debugger binding and the
//! runner launcher.
//!
//! None of these touch a device or spawn a process. Each records what it was
//! asked to do so tests can assert on the exact command sequence.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::debugger::{BindingError, CommandReturn, DebuggerBackend, DebuggerSession};
use crate::device::Bridge;
use crate::errors::{ErrorCode, HarnessError, Result};
use crate::scenario::TestSpec;
use crate::suite::{IsolatedLauncher, RunnerReport, RunnerRequest};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct BridgeRule {
    prefix: String,
    outputs: VecDeque<String>,
}

#[derive(Debug, Default)]
struct BridgeState {
    rules: Vec<BridgeRule>,
    calls: Vec<String>,
    async_calls: Vec<String>,
    fail_spawn: bool,
}

/// Bridge that answers from a table of command prefixes.
///
/// Commands are matched on their space-joined arguments; the first rule whose
/// prefix matches wins. Unmatched commands print nothing.
#[derive(Debug)]
pub struct MockBridge {
    program: PathBuf,
    state: Mutex<BridgeState>,
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBridge {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("adb"),
            state: Mutex::new(BridgeState::default()),
        }
    }

    pub fn respond(self, prefix: &str, output: &str) -> Self {
        self.respond_seq(prefix, [output])
    }

    /// Answer successive matching calls in order; the last output repeats.
    pub fn respond_seq<I>(self, prefix: &str, outputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        lock(&self.state).rules.push(BridgeRule {
            prefix: prefix.to_string(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Behave as if the bridge binary cannot be started.
    pub fn fail_spawn(self) -> Self {
        lock(&self.state).fail_spawn = true;
        self
    }

    /// Synchronous commands, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Commands started without waiting, in order.
    pub fn async_calls(&self) -> Vec<String> {
        lock(&self.state).async_calls.clone()
    }

    pub fn count_matching(&self, prefix: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn spawn_error(&self) -> HarnessError {
        HarnessError::DeviceCommand {
            program: self.program.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, "mock bridge refuses to start"),
        }
    }
}

impl Bridge for MockBridge {
    fn run(&self, args: &[&str]) -> Result<String> {
        let line = args.join(" ");
        let mut state = lock(&self.state);
        state.calls.push(line.clone());
        if state.fail_spawn {
            return Err(self.spawn_error());
        }
        let Some(rule) = state.rules.iter_mut().find(|rule| line.starts_with(&rule.prefix)) else {
            return Ok(String::new());
        };
        let output = if rule.outputs.len() > 1 {
            rule.outputs.pop_front()
        } else {
            rule.outputs.front().cloned()
        };
        Ok(output.unwrap_or_default())
    }

    fn spawn(&self, args: &[&str]) -> Result<()> {
        let mut state = lock(&self.state);
        state.async_calls.push(args.join(" "));
        if state.fail_spawn {
            return Err(self.spawn_error());
        }
        Ok(())
    }

    fn program(&self) -> &Path {
        &self.program
    }
}

/// Attach steps that [`MockDebugger::fail_at`] can break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachStep {
    SelectPlatform,
    Connect,
    CreateTarget,
    Attach,
}

#[derive(Debug, Default)]
struct DebuggerState {
    journal: Vec<String>,
    commands: Vec<String>,
    responses: HashMap<String, CommandReturn>,
    failures: HashMap<AttachStep, String>,
    interpreter_unready: bool,
    fail_initialize: bool,
}

/// Debugger binding with canned command output.
///
/// Clones share one journal, so a test can keep a handle while the runtime
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MockDebugger {
    state: Arc<Mutex<DebuggerState>>,
}

impl MockDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` successfully with `output`.
    pub fn respond(self, command: &str, output: &str) -> Self {
        lock(&self.state)
            .responses
            .insert(command.to_string(), CommandReturn::success(output));
        self
    }

    pub fn respond_failure(self, command: &str, error: &str) -> Self {
        lock(&self.state)
            .responses
            .insert(command.to_string(), CommandReturn::failure(error));
        self
    }

    /// Answer every step of `spec` with exactly what it expects.
    ///
    /// A command issued by several steps answers with the union of their
    /// expectations.
    pub fn satisfy(self, spec: &TestSpec) -> Self {
        {
            let mut state = lock(&self.state);
            for step in spec.script() {
                let mut lines = step.expect.clone();
                if lines.is_empty() {
                    lines.push("ok".to_string());
                }
                let entry = state
                    .responses
                    .entry(step.command.clone())
                    .or_insert_with(|| CommandReturn::success(""));
                for line in lines {
                    if !entry.output.is_empty() {
                        entry.output.push('\n');
                    }
                    entry.output.push_str(&line);
                }
            }
        }
        self
    }

    pub fn fail_at(self, step: AttachStep, message: &str) -> Self {
        lock(&self.state).failures.insert(step, message.to_string());
        self
    }

    pub fn interpreter_unready(self) -> Self {
        lock(&self.state).interpreter_unready = true;
        self
    }

    pub fn fail_initialize(self) -> Self {
        lock(&self.state).fail_initialize = true;
        self
    }

    /// Every binding call, in order.
    pub fn journal(&self) -> Vec<String> {
        lock(&self.state).journal.clone()
    }

    /// Journal entries after the last `marker`.
    pub fn journal_since(&self, marker: &str) -> Vec<String> {
        let state = lock(&self.state);
        let start = state
            .journal
            .iter()
            .rposition(|entry| entry == marker)
            .map_or(0, |index| index + 1);
        state.journal[start..].to_vec()
    }

    /// Interpreter commands issued across all sessions.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.state).commands.clone()
    }

    fn record(&self, entry: String) {
        lock(&self.state).journal.push(entry);
    }
}

impl DebuggerBackend for MockDebugger {
    type Session = MockSession;

    fn initialize(&self) -> Result<()> {
        self.record("initialize".to_string());
        if lock(&self.state).fail_initialize {
            return Err(HarnessError::environment(
                ErrorCode::DebuggerUnavailable,
                "mock debugger refused to initialize",
            ));
        }
        Ok(())
    }

    fn terminate(&self) {
        self.record("terminate".to_string());
    }

    fn create_session(&self) -> Result<MockSession> {
        self.record("create_session".to_string());
        Ok(MockSession {
            debugger: self.clone(),
        })
    }
}

/// Session handed out by [`MockDebugger`].
#[derive(Debug)]
pub struct MockSession {
    debugger: MockDebugger,
}

impl MockSession {
    fn step(&self, step: AttachStep, entry: String) -> std::result::Result<(), BindingError> {
        self.debugger.record(entry);
        match lock(&self.debugger.state).failures.get(&step) {
            Some(message) => Err(BindingError(message.clone())),
            None => Ok(()),
        }
    }
}

impl DebuggerSession for MockSession {
    fn select_platform(&mut self, kind: &str) -> std::result::Result<(), BindingError> {
        self.step(AttachStep::SelectPlatform, format!("select_platform {kind}"))
    }

    fn connect_platform(&mut self, url: &str) -> std::result::Result<(), BindingError> {
        self.step(AttachStep::Connect, format!("connect_platform {url}"))
    }

    fn create_null_target(&mut self) -> std::result::Result<(), BindingError> {
        self.step(AttachStep::CreateTarget, "create_null_target".to_string())
    }

    fn attach_to_pid(&mut self, pid: u32) -> std::result::Result<(), BindingError> {
        self.step(AttachStep::Attach, format!("attach_to_pid {pid}"))
    }

    fn interpreter_ready(&mut self) -> bool {
        self.debugger.record("interpreter_ready".to_string());
        !lock(&self.debugger.state).interpreter_unready
    }

    fn handle_command(&mut self, command: &str) -> CommandReturn {
        let mut state = lock(&self.debugger.state);
        state.journal.push(format!("command {command}"));
        state.commands.push(command.to_string());
        state
            .responses
            .get(command)
            .cloned()
            .unwrap_or_else(|| CommandReturn::success(""))
    }

    fn disconnect_platform(&mut self) -> std::result::Result<(), BindingError> {
        self.debugger.record("disconnect_platform".to_string());
        Ok(())
    }

    fn destroy(&mut self) {
        self.debugger.record("destroy".to_string());
    }
}

#[derive(Debug, Default)]
struct LauncherState {
    reports: HashMap<String, RunnerReport>,
    requests: Vec<RunnerRequest>,
}

/// Launcher that returns canned runner reports without starting a process.
///
/// Tests without a canned report get an empty stdout, which the suite reads
/// as an error.
#[derive(Debug, Clone, Default)]
pub struct MockLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner for `test` prints `stdout` and exits cleanly.
    pub fn respond(self, test: &str, stdout: &str) -> Self {
        self.report(
            test,
            RunnerReport {
                stdout: stdout.to_string(),
                exit_code: Some(0),
                ..RunnerReport::default()
            },
        )
    }

    /// Runner for `test` overruns its deadline and is killed.
    pub fn time_out(self, test: &str) -> Self {
        self.report(
            test,
            RunnerReport {
                timed_out: true,
                ..RunnerReport::default()
            },
        )
    }

    pub fn report(self, test: &str, report: RunnerReport) -> Self {
        lock(&self.state).reports.insert(test.to_string(), report);
        self
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<RunnerRequest> {
        lock(&self.state).requests.clone()
    }
}

impl IsolatedLauncher for MockLauncher {
    fn run_isolated(&self, request: &RunnerRequest) -> Result<RunnerReport> {
        let mut state = lock(&self.state);
        state.requests.push(request.clone());
        Ok(state
            .reports
            .get(&request.test)
            .cloned()
            .unwrap_or_default())
    }
}
