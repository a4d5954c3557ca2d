//! Remote Debug Harness - isolated test runner
//!
//! Runs exactly one test and exits. Stdout carries only the result: the pass
//! token, a one-line failure, or the timeout token written by the watchdog.
//! Diagnostics go to stderr and the shared log file.

#![forbid(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rdh_common::debugger::DebugSessionController;
use rdh_common::errors::ErrorCode;
use rdh_common::runner::{
    RUNNER_EXIT_INTERNAL, RUNNER_EXIT_OK, RUNNER_EXIT_UNEXPECTED, handoff_from_env,
};
use rdh_common::scenario::catalog;
use rdh_common::{
    AdbBridge, DebugServer, DebuggerRuntime, HarnessConfig, HarnessError, LldbDriver, LogConfig,
    RemoteDevice, TargetRegistry, TestBundle, TestRunner, Watchdog, init_logging,
};
use tracing::error;

#[derive(Parser)]
#[command(name = "rdh-run")]
#[command(author, version, about = "Run one harness test in isolation")]
struct Cli {
    /// Name of the test to run
    test: String,

    /// Configuration file, normally the one written by `rdh run`
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let code = std::panic::catch_unwind(run).unwrap_or(RUNNER_EXIT_UNEXPECTED);
    std::process::exit(code);
}

fn run() -> i32 {
    let cli = Cli::parse();
    match execute(&cli) {
        Ok(()) => RUNNER_EXIT_OK,
        Err(err) => {
            let harness = err.chain().find_map(|cause| cause.downcast_ref::<HarnessError>());
            let (message, code) = match harness {
                Some(harness) => (harness.diagnostic(), harness.exit_code()),
                None => (format!("{err:#}"), RUNNER_EXIT_INTERNAL),
            };
            error!(test = %cli.test, "{message}");
            eprintln!("rdh-run: {message}");
            code
        }
    }
}

fn execute(cli: &Cli) -> Result<()> {
    let config = HarnessConfig::load(Some(&cli.config))?;
    let mut log_config = LogConfig::from_env("info")
        .with_stderr()
        .with_file(config.log_file_path(), false);
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    let test = catalog::find(&cli.test).ok_or_else(|| {
        HarnessError::configuration(
            ErrorCode::UnknownTest,
            format!("unable to find test: {}", cli.test),
        )
    })?;
    let registry = TargetRegistry::builtin();
    registry.check_tests(std::slice::from_ref(&test))?;
    let handoff = handoff_from_env()?;

    let watchdog = Watchdog::arm(config.test_timeout());

    let bridge = AdbBridge::resolve(&config.adb_path)?;
    let device = RemoteDevice::new(bridge)
        .with_process_list_command(config.process_list_command.clone());
    let bundle = TestBundle::new(&device, registry, config.product_path.clone());

    let lldb = config.lldb_path.clone().ok_or_else(|| {
        HarnessError::environment(ErrorCode::DebuggerUnavailable, "no lldb_path configured")
    })?;
    let driver = LldbDriver::new(lldb).with_python_path(std::env::var("PYTHONPATH").ok());
    let runtime = DebuggerRuntime::global_start(driver)?;

    let runner = TestRunner::new(
        &device,
        &bundle,
        DebugSessionController::new(config.host_port),
        DebugServer::from_config(&config),
        config.device_port,
    );
    let outcome = runner.execute(&runtime, &test, handoff)?;
    runtime.global_stop();
    watchdog.disarm();

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", outcome.report_line())?;
    stdout.flush()?;
    Ok(())
}
