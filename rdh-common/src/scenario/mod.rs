//! Scripted debugger tests.
//!
//! A test is data: a name, the bundle targets it runs against, and an ordered
//! script of commands with the substrings each command's output must contain.

pub mod catalog;

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::debugger::DebuggerSession;

/// One scripted command and what its output must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    pub command: String,
    pub expect: Vec<String>,
    /// Accept a successful command that printed nothing.
    pub allow_empty_output: bool,
}

/// Why a step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error("command \"{command}\" failed: {error}")]
    CommandFailed { command: String, error: String },

    #[error("command \"{command}\" had no output")]
    NoOutput { command: String },

    #[error("expected to find \"{expected}\" in the output of \"{command}\"")]
    Missing {
        command: String,
        expected: String,
        output: String,
    },
}

/// First failed step of a script; remaining steps were not issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step {index}: {failure}")]
pub struct AssertionFailure {
    pub index: usize,
    pub failure: StepFailure,
}

impl ScriptStep {
    pub fn new(command: impl Into<String>, expect: &[&str]) -> Self {
        Self {
            command: command.into(),
            expect: expect.iter().map(|s| s.to_string()).collect(),
            allow_empty_output: false,
        }
    }

    /// Issue the command and check its output.
    pub fn execute(
        &self,
        session: &mut dyn DebuggerSession,
        transcript: &mut Transcript,
    ) -> Result<(), StepFailure> {
        let ret = session.handle_command(&self.command);
        transcript.record(&self.command, &ret.output, &ret.error);
        if !ret.succeeded {
            return Err(StepFailure::CommandFailed {
                command: self.command.clone(),
                error: ret.error.trim().to_string(),
            });
        }
        if ret.output.is_empty() && !self.allow_empty_output {
            return Err(StepFailure::NoOutput {
                command: self.command.clone(),
            });
        }
        if let Some(missing) = self.expect.iter().find(|s| !ret.output.contains(s.as_str())) {
            return Err(StepFailure::Missing {
                command: self.command.clone(),
                expected: missing.clone(),
                output: ret.output,
            });
        }
        Ok(())
    }
}

/// Commands issued during a test and what came back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub command: String,
    pub output: String,
    pub error: String,
}

impl Transcript {
    pub fn record(&mut self, command: &str, output: &str, error: &str) {
        self.entries.push(TranscriptEntry {
            command: command.to_string(),
            output: output.to_string(),
            error: error.to_string(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "(lldb) {}", entry.command)?;
            for line in entry.output.lines().chain(entry.error.lines()) {
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

/// Capability set every runnable test provides.
pub trait DebugTest {
    fn name(&self) -> &str;

    /// Targets to launch; empty means the test needs no process.
    fn bundle_targets(&self) -> &[String];

    fn run(
        &self,
        session: &mut dyn DebuggerSession,
        transcript: &mut Transcript,
    ) -> Result<(), AssertionFailure>;

    fn post_run(&self, _session: &mut dyn DebuggerSession) {}
}

/// Immutable, data-driven test definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSpec {
    name: String,
    targets: Vec<String>,
    script: Vec<ScriptStep>,
}

impl TestSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            targets: Vec::new(),
            script: Vec::new(),
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    pub fn step(mut self, command: impl Into<String>, expect: &[&str]) -> Self {
        self.script.push(ScriptStep::new(command, expect));
        self
    }

    /// A step that only has to succeed; it may print nothing.
    pub fn step_quiet(mut self, command: impl Into<String>) -> Self {
        let mut step = ScriptStep::new(command, &[]);
        step.allow_empty_output = true;
        self.script.push(step);
        self
    }

    /// Run `expr` and `frame variable` on a local; both must print `expect`.
    pub fn inspect_local(self, local: &str, expect: &[&str]) -> Self {
        self.step(format!("expr {local}"), expect)
            .step(format!("frame variable {local}"), expect)
    }

    /// Run `expr` and `target variable` on a global; both must print `expect`.
    pub fn inspect_global(self, global: &str, expect: &[&str]) -> Self {
        self.step(format!("expr {global}"), expect)
            .step(format!("target variable {global}"), expect)
    }

    pub fn script(&self) -> &[ScriptStep] {
        &self.script
    }
}

impl DebugTest for TestSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn bundle_targets(&self) -> &[String] {
        &self.targets
    }

    fn run(
        &self,
        session: &mut dyn DebuggerSession,
        transcript: &mut Transcript,
    ) -> Result<(), AssertionFailure> {
        for (index, step) in self.script.iter().enumerate() {
            debug!(test = %self.name, index, command = %step.command, "step");
            step.execute(session, transcript)
                .map_err(|failure| AssertionFailure { index, failure })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::DebuggerBackend;
    use crate::mock::MockDebugger;

    #[test]
    fn test_first_failure_short_circuits_script() {
        let debugger = MockDebugger::new()
            .respond("language renderscript status", "Runtime Library discovered\n");
        let mut session = debugger.create_session().unwrap();
        let spec = TestSpec::new("t")
            .step("language renderscript status", &["Runtime Driver discovered"])
            .step("process continue", &["stopped"])
            .step("bt", &["simple_kernel"]);

        let mut transcript = Transcript::default();
        let err = spec.run(&mut session, &mut transcript).unwrap_err();
        assert_eq!(err.index, 0);
        assert!(matches!(
            err.failure,
            StepFailure::Missing { ref expected, .. } if expected == "Runtime Driver discovered"
        ));
        assert_eq!(debugger.commands(), vec!["language renderscript status"]);
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn test_empty_output_fails_unless_allowed() {
        let debugger = MockDebugger::new();
        let mut session = debugger.create_session().unwrap();
        let mut transcript = Transcript::default();

        let quiet = TestSpec::new("quiet").step_quiet("language");
        quiet.run(&mut session, &mut transcript).unwrap();

        let strict = TestSpec::new("strict").step("language", &[]);
        let err = strict.run(&mut session, &mut transcript).unwrap_err();
        assert_eq!(
            err.failure,
            StepFailure::NoOutput {
                command: "language".to_string()
            }
        );
    }

    #[test]
    fn test_failed_command_is_step_failure() {
        let debugger = MockDebugger::new().respond_failure("bt", "error: invalid thread");
        let mut session = debugger.create_session().unwrap();
        let mut transcript = Transcript::default();
        let err = TestSpec::new("t")
            .step("bt", &["frame #0"])
            .run(&mut session, &mut transcript)
            .unwrap_err();
        assert!(matches!(err.failure, StepFailure::CommandFailed { .. }));
        assert!(transcript.to_string().contains("error: invalid thread"));
    }

    #[test]
    fn test_expected_substrings_are_order_independent() {
        let debugger = MockDebugger::new()
            .respond("bt", "frame #0: simple_kernel\nstop reason = breakpoint\n");
        let mut session = debugger.create_session().unwrap();
        let mut transcript = Transcript::default();
        TestSpec::new("t")
            .step("bt", &["stop reason = breakpoint", "frame #0:", "simple_kernel"])
            .run(&mut session, &mut transcript)
            .unwrap();
        assert_eq!(
            transcript.to_string(),
            "(lldb) bt\nframe #0: simple_kernel\nstop reason = breakpoint\n"
        );
    }

    #[test]
    fn test_inspect_helpers_expand_to_two_steps() {
        let spec = TestSpec::new("t")
            .inspect_global("c", &["(signed char)"])
            .inspect_local("i", &["(int)"]);
        let commands: Vec<&str> = spec.script().iter().map(|s| s.command.as_str()).collect();
        assert_eq!(
            commands,
            ["expr c", "target variable c", "expr i", "frame variable i"]
        );
    }
}
