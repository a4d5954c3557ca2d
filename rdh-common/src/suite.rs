//! Suite orchestration.
//!
//! `Validate -> Setup -> {per test and target: Clean -> Launch -> Execute ->
//! Collect -> CleanupPid -> Clean} -> Teardown -> Summarize`. Tests never overlap; the
//! device is only touched from this thread and from the one runner process
//! that is alive at a time.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bundle::{TargetRegistry, TestBundle};
use crate::config::HarnessConfig;
use crate::device::{Bridge, RemoteDevice, RemoteProcessHandle};
use crate::errors::{ErrorCode, HarnessError, Result};
use crate::runner::{PASS_TOKEN, TARGET_ENV, TARGET_PID_ENV};
use crate::scenario::{DebugTest, TestSpec};

/// Extra time a runner gets past its own watchdog before the suite kills it.
pub const RUNNER_GRACE: Duration = Duration::from_secs(30);

/// File written into `log_dir` after the summary.
pub const RESULTS_FILE: &str = "results.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
        })
    }
}

/// Everything the parent saw of one runner process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerReport {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl RunnerReport {
    /// Pass token anywhere in stdout passes; other output fails; silence is
    /// an error. A runner killed for overrunning always fails.
    pub fn outcome(&self) -> TestOutcome {
        if self.timed_out {
            TestOutcome::Fail
        } else if self.stdout.contains(PASS_TOKEN) {
            TestOutcome::Pass
        } else if !self.stdout.is_empty() {
            TestOutcome::Fail
        } else {
            TestOutcome::Error
        }
    }
}

/// One isolated runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerRequest {
    pub test: String,
    pub config_path: PathBuf,
    pub handoff: Option<RemoteProcessHandle>,
    /// Hard deadline after which the runner is killed.
    pub deadline: Duration,
}

/// Starts a fresh runner for one test and waits for it.
pub trait IsolatedLauncher {
    fn run_isolated(&self, request: &RunnerRequest) -> Result<RunnerReport>;
}

/// Launches the `rdh-run` binary as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    python_path: Option<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            python_path: None,
        }
    }

    pub fn with_python_path(mut self, python_path: Option<String>) -> Self {
        self.python_path = python_path;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl IsolatedLauncher for ProcessLauncher {
    fn run_isolated(&self, request: &RunnerRequest) -> Result<RunnerReport> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&request.test)
            .arg(&request.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(path) = &self.python_path {
            cmd.env("PYTHONPATH", path);
        }
        match &request.handoff {
            Some(handle) => {
                cmd.env(TARGET_PID_ENV, handle.pid.to_string())
                    .env(TARGET_ENV, &handle.target);
            }
            None => {
                cmd.env_remove(TARGET_PID_ENV).env_remove(TARGET_ENV);
            }
        }

        debug!(program = %self.program.display(), test = %request.test, "spawning runner");
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(HarnessError::io(format!(
            "unable to start runner {}",
            self.program.display()
        )))?;
        let stdout_handle = child.stdout.take().map(|out| thread::spawn(move || read_all(out)));
        let stderr_handle = child.stderr.take().map(|err| thread::spawn(move || read_all(err)));

        let mut timed_out = false;
        let status = loop {
            if let Some(status) = child
                .try_wait()
                .map_err(HarnessError::io("waiting for runner"))?
            {
                break Some(status);
            }
            if start.elapsed() >= request.deadline {
                timed_out = true;
                warn!(
                    test = %request.test,
                    deadline = ?request.deadline,
                    "runner overran, killing it"
                );
                let _ = child.kill();
                break child.wait().ok();
            }
            thread::sleep(Duration::from_millis(10));
        };

        Ok(RunnerReport {
            stdout: join_output(stdout_handle),
            stderr: join_output(stderr_handle),
            exit_code: status.and_then(|status| status.code()),
            timed_out,
        })
    }
}

fn read_all(mut reader: impl Read) -> String {
    let mut buffer = Vec::new();
    let _ = reader.read_to_end(&mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

fn join_output(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Outcomes keyed by `test` or `test:target`; a repeated key overwrites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultBook {
    results: BTreeMap<String, TestOutcome>,
}

impl ResultBook {
    pub fn key(test: &str, target: Option<&str>) -> String {
        match target {
            Some(target) => format!("{test}:{target}"),
            None => test.to_string(),
        }
    }

    pub fn record(&mut self, test: &str, target: Option<&str>, outcome: TestOutcome) {
        self.results.insert(Self::key(test, target), outcome);
    }

    pub fn get(&self, key: &str) -> Option<TestOutcome> {
        self.results.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TestOutcome)> {
        self.results.iter().map(|(key, outcome)| (key.as_str(), *outcome))
    }

    pub fn summary(&self) -> Summary {
        let count = |wanted| self.results.values().filter(|o| **o == wanted).count();
        Summary {
            passed: count(TestOutcome::Pass),
            failed: count(TestOutcome::Fail),
            errors: count(TestOutcome::Error),
            total: self.results.len(),
        }
    }

    /// Write `results.json` into `dir`.
    pub fn write_report(&self, dir: &Path) -> Result<PathBuf> {
        #[derive(Serialize)]
        struct Report<'a> {
            generated_at: String,
            results: &'a ResultBook,
            summary: Summary,
        }

        let report = Report {
            generated_at: chrono::Utc::now().to_rfc3339(),
            results: self,
            summary: self.summary(),
        };
        let rendered =
            serde_json::to_string_pretty(&report).map_err(|err| HarnessError::Serialization {
                what: "results report",
                message: err.to_string(),
            })?;
        std::fs::create_dir_all(dir)
            .map_err(HarnessError::io(format!("creating {}", dir.display())))?;
        let path = dir.join(RESULTS_FILE);
        std::fs::write(&path, rendered)
            .map_err(HarnessError::io(format!("writing {}", path.display())))?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub total: usize,
}

impl Summary {
    /// Integer pass rate, `None` when nothing ran.
    pub fn percent(&self) -> Option<usize> {
        (self.total > 0).then(|| self.passed * 100 / self.total)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent() {
            Some(percent) => write!(f, "{} of {} passed: {percent}%", self.passed, self.total),
            None => f.write_str("no tests run"),
        }
    }
}

/// Run `<lldb> -P` to find the scripting bindings.
///
/// `Ok(None)` when no debugger is configured or it printed nothing.
pub fn deduce_binding_path(lldb: Option<&Path>) -> Result<Option<String>> {
    let Some(lldb) = lldb else {
        return Ok(None);
    };
    let resolved = if lldb.components().count() > 1 {
        lldb.exists().then(|| lldb.to_path_buf())
    } else {
        which::which(lldb).ok()
    };
    let Some(resolved) = resolved else {
        return Err(HarnessError::configuration(
            ErrorCode::ConfigValidationError,
            format!("invalid lldb path {}", lldb.display()),
        ));
    };
    let output = Command::new(&resolved)
        .arg("-P")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(HarnessError::io(format!("running {} -P", resolved.display())))?;
    let path = String::from_utf8_lossy(&output.stdout).replace('\n', "");
    let path = path.trim();
    Ok((!path.is_empty()).then(|| path.to_string()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteOptions {
    pub skip_push: bool,
    /// Only run these tests; empty runs the whole catalog.
    pub only: Vec<String>,
}

/// Called after each (test, target) iteration with its key and outcome.
pub type ResultCallback<'a> = &'a mut dyn FnMut(&str, TestOutcome, Option<&RunnerReport>);

pub struct Suite<B: Bridge, L: IsolatedLauncher> {
    config: HarnessConfig,
    device: RemoteDevice<B>,
    registry: TargetRegistry,
    tests: Vec<TestSpec>,
    launcher: L,
    options: SuiteOptions,
}

impl<B: Bridge, L: IsolatedLauncher> Suite<B, L> {
    /// Check the catalog against the registry and apply the test filter.
    pub fn new(
        config: HarnessConfig,
        device: RemoteDevice<B>,
        registry: TargetRegistry,
        tests: Vec<TestSpec>,
        launcher: L,
        options: SuiteOptions,
    ) -> Result<Self> {
        registry.check_tests(&tests)?;
        if let Some(unknown) = options
            .only
            .iter()
            .find(|name| !tests.iter().any(|test| test.name() == name.as_str()))
        {
            return Err(HarnessError::configuration(
                ErrorCode::UnknownTest,
                format!("unable to find test: {unknown}"),
            ));
        }
        let tests = if options.only.is_empty() {
            tests
        } else {
            tests
                .into_iter()
                .filter(|test| options.only.iter().any(|name| name == test.name()))
                .collect()
        };
        Ok(Self {
            config,
            device,
            registry,
            tests,
            launcher,
            options,
        })
    }

    pub fn device(&self) -> &RemoteDevice<B> {
        &self.device
    }

    pub fn tests(&self) -> &[TestSpec] {
        &self.tests
    }

    fn bundle(&self) -> TestBundle<'_, B> {
        TestBundle::new(
            &self.device,
            self.registry.clone(),
            self.config.product_path.clone(),
        )
    }

    /// Bridge reachable, exactly one device, debug-server present.
    pub fn validate(&self) -> Result<()> {
        self.device.validate_bridge_available()?;
        self.device.validate_single_device_attached()?;
        self.device
            .validate_debug_server(&self.config.lldb_server_path)?;
        info!("validation complete");
        Ok(())
    }

    fn forward_debug_port(&self) -> Result<()> {
        self.device
            .forward_port(self.config.host_port, self.config.device_port)
    }

    /// Kill stray debug-servers, restoring the port forward if that took a reboot.
    fn clean(&self) -> Result<()> {
        if self.device.clean_device()? {
            warn!("device rebooted during cleanup, forwarding debug port again");
            self.forward_debug_port()?;
        }
        Ok(())
    }

    /// Root the device, deploy the bundle and forward the debug port.
    pub fn setup(&self) -> Result<()> {
        self.device.root()?;
        self.device.wait_for_device()?;
        if self.options.skip_push {
            info!("skipping bundle push");
        } else {
            self.bundle().push_all()?;
            info!("pushed all tests");
        }
        self.forward_debug_port()?;
        info!("setup complete");
        Ok(())
    }

    /// Validate, set up, run every test, then tear down.
    pub fn run(&self, on_result: ResultCallback<'_>) -> Result<ResultBook> {
        self.validate()?;
        self.setup()?;
        let config_path = self.config.write_effective()?;
        let book = self.run_tests(&config_path, on_result)?;
        self.teardown()?;
        Ok(book)
    }

    /// Leave no debug-server running once the suite is done.
    pub fn teardown(&self) -> Result<()> {
        self.device.clean_device()?;
        info!("teardown complete");
        Ok(())
    }

    /// Run every test once per declared target (once if it declares none).
    pub fn run_tests(
        &self,
        config_path: &Path,
        on_result: ResultCallback<'_>,
    ) -> Result<ResultBook> {
        info!(count = self.tests.len(), "running tests");
        let bundle = self.bundle();
        let mut book = ResultBook::default();
        for test in &self.tests {
            let targets: Vec<Option<&str>> = if test.bundle_targets().is_empty() {
                vec![None]
            } else {
                test.bundle_targets().iter().map(|t| Some(t.as_str())).collect()
            };
            for target in targets {
                let (outcome, report) = self.run_one(&bundle, test, target, config_path)?;
                book.record(test.name(), target, outcome);
                on_result(&ResultBook::key(test.name(), target), outcome, report.as_ref());
            }
        }
        Ok(book)
    }

    fn run_one(
        &self,
        bundle: &TestBundle<'_, B>,
        test: &TestSpec,
        target: Option<&str>,
        config_path: &Path,
    ) -> Result<(TestOutcome, Option<RunnerReport>)> {
        self.clean()?;

        let handoff = match target {
            Some(name) => match bundle.launch(name)? {
                Some(handle) => Some(handle),
                None => {
                    warn!(test = test.name(), target = name, "unable to get pid of target");
                    self.clean()?;
                    return Ok((TestOutcome::Fail, None));
                }
            },
            None => None,
        };

        let request = RunnerRequest {
            test: test.name().to_string(),
            config_path: config_path.to_path_buf(),
            handoff: handoff.clone(),
            deadline: self.config.test_timeout() + RUNNER_GRACE,
        };
        let report = self.launcher.run_isolated(&request)?;
        let outcome = report.outcome();
        if outcome != TestOutcome::Pass {
            info!(
                test = test.name(),
                exit_code = ?report.exit_code,
                "runner output:\n{}",
                report.stdout
            );
        }
        if !report.stderr.is_empty() {
            debug!(test = test.name(), "runner stderr:\n{}", report.stderr);
        }

        if let Some(handle) = handoff {
            self.device.kill_pid(handle.pid)?;
        }
        self.clean()?;
        Ok((outcome, Some(report)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceTimings;
    use crate::mock::{MockBridge, MockLauncher};

    fn report(stdout: &str) -> RunnerReport {
        RunnerReport {
            stdout: stdout.to_string(),
            ..RunnerReport::default()
        }
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(report("log line\n@pass@\n").outcome(), TestOutcome::Pass);
        assert_eq!(report("test t failed: step 0").outcome(), TestOutcome::Fail);
        assert_eq!(report("@timeout@\n").outcome(), TestOutcome::Fail);
        assert_eq!(report("").outcome(), TestOutcome::Error);
        let overran = RunnerReport {
            stdout: "@pass@".to_string(),
            timed_out: true,
            ..RunnerReport::default()
        };
        assert_eq!(overran.outcome(), TestOutcome::Fail);
    }

    #[test]
    fn test_summary_with_no_tests() {
        let summary = ResultBook::default().summary();
        assert_eq!(summary.percent(), None);
        assert_eq!(summary.to_string(), "no tests run");
    }

    #[test]
    fn test_summary_uses_integer_division() {
        let mut book = ResultBook::default();
        book.record("a", None, TestOutcome::Pass);
        book.record("b", Some("X"), TestOutcome::Fail);
        book.record("c", Some("Y"), TestOutcome::Error);
        let summary = book.summary();
        assert_eq!(summary.to_string(), "1 of 3 passed: 33%");
        assert_eq!((summary.failed, summary.errors), (1, 1));
    }

    #[test]
    fn test_repeated_key_overwrites() {
        let mut book = ResultBook::default();
        book.record("a", Some("X"), TestOutcome::Fail);
        book.record("a", Some("X"), TestOutcome::Pass);
        assert_eq!(book.summary().total, 1);
        assert_eq!(book.get("a:X"), Some(TestOutcome::Pass));
    }

    #[test]
    fn test_report_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut book = ResultBook::default();
        book.record("test_cmd_language", None, TestOutcome::Pass);
        let path = book.write_report(dir.path()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["results"]["test_cmd_language"], "pass");
        assert_eq!(value["summary"]["passed"], 1);
        assert!(value["generated_at"].is_string());
    }

    #[test]
    fn test_unknown_test_filter_is_config_error() {
        let device = RemoteDevice::new(MockBridge::new()).with_timings(DeviceTimings::none());
        let options = SuiteOptions {
            only: vec!["test_nope".to_string()],
            ..SuiteOptions::default()
        };
        let err = Suite::new(
            HarnessConfig::default(),
            device,
            TargetRegistry::builtin(),
            crate::scenario::catalog::builtin(),
            MockLauncher::new(),
            options,
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), ErrorCode::UnknownTest);
    }

    #[test]
    fn test_binding_path_absent_without_debugger() {
        assert_eq!(deduce_binding_path(None).unwrap(), None);
        let err = deduce_binding_path(Some(Path::new("/nonexistent/lldb"))).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigValidationError);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_launcher_kills_overrunning_runner() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-runner");
        std::fs::write(&script, "#!/bin/sh\necho started\nsleep 30\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let launcher = ProcessLauncher::new(&script);
        let report = launcher
            .run_isolated(&RunnerRequest {
                test: "t".to_string(),
                config_path: dir.path().join("cfg.toml"),
                handoff: None,
                deadline: Duration::from_millis(300),
            })
            .unwrap();
        assert!(report.timed_out);
        assert_eq!(report.outcome(), TestOutcome::Fail);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_launcher_passes_arguments_and_handoff() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("echo-runner");
        std::fs::write(
            &script,
            "#!/bin/sh\necho \"$1 $2 $RDH_TARGET_PID $RDH_TARGET\"\necho @pass@\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let report = ProcessLauncher::new(&script)
            .run_isolated(&RunnerRequest {
                test: "test_read_global".to_string(),
                config_path: PathBuf::from("/tmp/cfg.toml"),
                handoff: Some(RemoteProcessHandle {
                    pid: 77,
                    target: "GlobalScalarVariables".to_string(),
                }),
                deadline: Duration::from_secs(30),
            })
            .unwrap();
        assert_eq!(report.exit_code, Some(0));
        assert!(report
            .stdout
            .starts_with("test_read_global /tmp/cfg.toml 77 GlobalScalarVariables\n"));
        assert_eq!(report.outcome(), TestOutcome::Pass);
    }
}
