//! Isolated execution of a single test.
//!
//! One runner process runs exactly one test through
//! `PreRun -> Run -> PostRun -> Report`. The only thing the parent reads back
//! is stdout: the pass token means the test passed, anything else is a failure
//! and is logged verbatim.

use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::bundle::TestBundle;
use crate::debugger::{
    AttachError, DebugSessionController, DebuggerBackend, DebuggerRuntime, DebuggerSession,
};
use crate::device::{Bridge, DebugServer, RemoteDevice, RemoteProcessHandle};
use crate::errors::{ErrorCode, HarnessError, Result};
use crate::scenario::{AssertionFailure, DebugTest, Transcript};

/// Printed by a runner whose test passed.
pub const PASS_TOKEN: &str = "@pass@";

/// Printed by the watchdog just before it kills the runner.
pub const TIMEOUT_TOKEN: &str = "@timeout@";

/// Pid of a target the suite already launched.
pub const TARGET_PID_ENV: &str = "RDH_TARGET_PID";

/// Name of the target the suite already launched.
pub const TARGET_ENV: &str = "RDH_TARGET";

/// Runner exit code for a completed run, pass or fail.
pub const RUNNER_EXIT_OK: i32 = 0;
/// Runner exit code for an internal error.
pub const RUNNER_EXIT_INTERNAL: i32 = 1;
/// Runner exit code for a suite-level error (config, environment).
pub const RUNNER_EXIT_SUITE: i32 = 2;
/// Runner exit code for a panic.
pub const RUNNER_EXIT_UNEXPECTED: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    PreRun,
    Run,
    PostRun,
    Report,
}

/// Why a test did not pass. Never escapes the runner.
#[derive(Debug, Error)]
pub enum TestFailure {
    #[error("unable to get pid of target {target}")]
    NoPid { target: String },

    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error("the debugger command interpreter is not ready")]
    InterpreterUnavailable,

    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    #[error("{0}")]
    Harness(#[from] HarnessError),
}

impl TestFailure {
    /// Catalog code used when logging the failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoPid { .. } | Self::Attach(_) => ErrorCode::AttachFailed,
            Self::InterpreterUnavailable => ErrorCode::DebuggerUnavailable,
            Self::Assertion(_) => ErrorCode::AssertionFailed,
            Self::Harness(err) => err.code(),
        }
    }
}

/// What one runner invocation did.
#[derive(Debug)]
pub struct RunnerOutcome {
    pub test: String,
    pub phases: Vec<RunnerPhase>,
    pub result: std::result::Result<(), TestFailure>,
    pub transcript: Transcript,
}

impl RunnerOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }

    /// Text the runner writes to stdout for the parent.
    pub fn report_line(&self) -> String {
        match &self.result {
            Ok(()) => PASS_TOKEN.to_string(),
            Err(failure) => format!("test {} failed: {failure}", self.test),
        }
    }
}

/// A target launched by the suite and handed to the runner.
pub fn handoff_from_env() -> Result<Option<RemoteProcessHandle>> {
    let (Ok(pid), Ok(target)) = (std::env::var(TARGET_PID_ENV), std::env::var(TARGET_ENV)) else {
        return Ok(None);
    };
    let pid = pid.trim().parse().map_err(|_| HarnessError::InvalidArgument {
        operation: "handoff_from_env",
        argument: TARGET_PID_ENV,
    })?;
    Ok(Some(RemoteProcessHandle { pid, target }))
}

/// Drives one test against one (optional) target.
pub struct TestRunner<'a, B: Bridge> {
    device: &'a RemoteDevice<B>,
    bundle: &'a TestBundle<'a, B>,
    controller: DebugSessionController,
    server: DebugServer,
    device_port: u16,
}

impl<'a, B: Bridge> TestRunner<'a, B> {
    pub fn new(
        device: &'a RemoteDevice<B>,
        bundle: &'a TestBundle<'a, B>,
        controller: DebugSessionController,
        server: DebugServer,
        device_port: u16,
    ) -> Self {
        Self {
            device,
            bundle,
            controller,
            server,
            device_port,
        }
    }

    /// Run `test` to completion.
    ///
    /// Errors returned here are suite-level (unknown target, bridge failure);
    /// everything scoped to the test ends up in [`RunnerOutcome::result`].
    pub fn execute<D: DebuggerBackend>(
        &self,
        runtime: &DebuggerRuntime<D>,
        test: &dyn DebugTest,
        handoff: Option<RemoteProcessHandle>,
    ) -> Result<RunnerOutcome> {
        info!(test = test.name(), "running");
        let mut outcome = RunnerOutcome {
            test: test.name().to_string(),
            phases: vec![RunnerPhase::PreRun],
            result: Ok(()),
            transcript: Transcript::default(),
        };

        let target = match self.pre_run(test, handoff) {
            Ok(target) => target,
            Err(TestFailure::Harness(err)) => return Err(err),
            Err(failure) => {
                outcome.result = Err(failure);
                outcome.phases.push(RunnerPhase::Report);
                return Ok(outcome);
            }
        };

        outcome.phases.push(RunnerPhase::Run);
        let mut managed = runtime.create_session()?;
        if let Some(session) = managed.get() {
            outcome.result =
                self.run(test, &mut *session, target.as_ref(), &mut outcome.transcript);
            if outcome.result.is_err() {
                warn!(test = test.name(), "transcript:\n{}", outcome.transcript);
            }

            outcome.phases.push(RunnerPhase::PostRun);
            test.post_run(&mut *session);
            if target.is_some() {
                self.controller.disconnect(&mut *session);
            }
        }
        runtime.destroy_session(managed);

        outcome.phases.push(RunnerPhase::Report);
        match &outcome.result {
            Ok(()) => info!(test = test.name(), "passed"),
            Err(failure) => error!(test = test.name(), code = %failure.code(), "failed: {failure}"),
        }
        Ok(outcome)
    }

    /// Resolve the target and start the debug-server.
    fn pre_run(
        &self,
        test: &dyn DebugTest,
        handoff: Option<RemoteProcessHandle>,
    ) -> std::result::Result<Option<RemoteProcessHandle>, TestFailure> {
        let target = match (handoff, test.bundle_targets().first()) {
            (Some(handle), _) => {
                debug!(pid = handle.pid, target = %handle.target, "using launched target");
                Some(handle)
            }
            (None, Some(name)) => Some(
                self.bundle
                    .launch(name)?
                    .ok_or_else(|| TestFailure::NoPid {
                        target: name.clone(),
                    })?,
            ),
            (None, None) => None,
        };
        if target.is_some() {
            self.device
                .start_remote_debug_server(&self.server, self.device_port)?;
        }
        Ok(target)
    }

    fn run(
        &self,
        test: &dyn DebugTest,
        session: &mut dyn DebuggerSession,
        target: Option<&RemoteProcessHandle>,
        transcript: &mut Transcript,
    ) -> std::result::Result<(), TestFailure> {
        if let Some(target) = target {
            self.controller.attach_to_remote(session, target.pid)?;
        }
        if !session.interpreter_ready() {
            return Err(TestFailure::InterpreterUnavailable);
        }
        test.run(session, transcript)?;
        Ok(())
    }
}

/// Kills the process if a test outlives its budget.
///
/// Dropping the watchdog disarms it.
pub struct Watchdog {
    disarm: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Print [`TIMEOUT_TOKEN`] and hard-exit when `timeout` elapses.
    pub fn arm(timeout: Duration) -> Self {
        Self::arm_with(timeout, || {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{TIMEOUT_TOKEN}");
            let _ = stdout.flush();
            std::process::exit(RUNNER_EXIT_INTERNAL);
        })
    }

    pub fn arm_with(timeout: Duration, on_fire: impl FnOnce() + Send + 'static) -> Self {
        let (disarm, fired) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = fired.recv_timeout(timeout) {
                error!(?timeout, code = %ErrorCode::TestTimeout, "test timed out");
                on_fire();
            }
        });
        Self {
            disarm: Some(disarm),
            handle: Some(handle),
        }
    }

    pub fn disarm(self) {
        drop(self);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(disarm) = self.disarm.take() {
            let _ = disarm.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
