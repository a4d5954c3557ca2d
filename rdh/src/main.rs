//! Remote Debug Harness - suite entry point
//!
//! Validates the attached device, deploys the test bundle and runs every
//! scripted debugger test in its own `rdh-run` process.

#![forbid(unsafe_code)]

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rdh_common::errors::EXIT_INTERNAL;
use rdh_common::scenario::catalog;
use rdh_common::suite::{RunnerReport, deduce_binding_path};
use rdh_common::{
    AdbBridge, DebugTest, HarnessConfig, HarnessError, LogConfig, ProcessLauncher, RemoteDevice,
    Suite, SuiteOptions, TargetRegistry, TestOutcome, init_logging,
};
use tracing::{info, warn};

/// File name of the isolated runner, expected next to this binary.
const RUNNER_BIN: &str = "rdh-run";

#[derive(Parser)]
#[command(name = "rdh")]
#[command(
    author,
    version,
    about = "Remote Debug Harness - RenderScript debugger tests on a device"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the device, deploy the bundle and run the tests
    Run {
        /// TOML configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Reuse what is already installed on the device
        #[arg(long)]
        skip_push: bool,

        /// Only run this test (repeatable)
        #[arg(short, long = "test", value_name = "NAME")]
        tests: Vec<String>,
    },

    /// List the built-in tests and their targets
    List,

    /// Check the bridge, the device and the debug-server only
    Doctor {
        /// TOML configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Commands::Run {
            config,
            skip_push,
            tests,
        } => run_suite(config.as_deref(), skip_push, tests, cli.verbose),
        Commands::List => {
            list_tests();
            Ok(())
        }
        Commands::Doctor { config } => doctor(config.as_deref(), cli.verbose),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let harness = err.chain().find_map(|cause| cause.downcast_ref::<HarnessError>());
            let (message, code) = match harness {
                Some(harness) => (harness.diagnostic(), harness.exit_code()),
                None => (format!("{err:#}"), EXIT_INTERNAL),
            };
            eprintln!("{} {message}", "error:".red().bold());
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn log_config(verbose: bool) -> LogConfig {
    let config = LogConfig::from_env("info").with_stderr();
    if verbose {
        config.with_level("debug")
    } else {
        config
    }
}

fn build_suite(
    config: &HarnessConfig,
    options: SuiteOptions,
) -> Result<Suite<AdbBridge, ProcessLauncher>> {
    let python_path = deduce_binding_path(config.lldb_path.as_deref())?;
    match &python_path {
        Some(path) => info!(%path, "PYTHONPATH deduced"),
        None => warn!("unable to deduce PYTHONPATH"),
    }

    let bridge = AdbBridge::resolve(&config.adb_path)?;
    let device = RemoteDevice::new(bridge)
        .with_process_list_command(config.process_list_command.clone());
    let launcher = ProcessLauncher::new(runner_program()?).with_python_path(python_path);
    let suite = Suite::new(
        config.clone(),
        device,
        TargetRegistry::builtin(),
        catalog::builtin(),
        launcher,
        options,
    )?;
    Ok(suite)
}

fn run_suite(
    config_path: Option<&Path>,
    skip_push: bool,
    tests: Vec<String>,
    verbose: bool,
) -> Result<()> {
    let config = HarnessConfig::load(config_path)?;
    let _logging_guards =
        init_logging(&log_config(verbose).with_file(config.log_file_path(), true))?;

    let suite = build_suite(
        &config,
        SuiteOptions {
            skip_push,
            only: tests,
        },
    )?;
    let book = suite.run(&mut print_result)?;

    let summary = book.summary();
    let line = summary.to_string();
    if summary.passed == summary.total && summary.total > 0 {
        println!("{}", line.green().bold());
    } else {
        println!("{}", line.bold());
    }
    let report = book.write_report(&config.log_dir)?;
    info!(path = %report.display(), "results written");
    Ok(())
}

fn print_result(key: &str, outcome: TestOutcome, report: Option<&RunnerReport>) {
    let label = match outcome {
        TestOutcome::Pass => "PASS".green().bold(),
        TestOutcome::Fail => "FAIL".red().bold(),
        TestOutcome::Error => "ERROR".yellow().bold(),
    };
    let note = match report {
        Some(report) if report.timed_out => " (timeout)",
        None => " (no pid)",
        _ => "",
    };
    println!("[{label}] {key}{note}");
}

fn list_tests() {
    for test in catalog::builtin() {
        let targets = if test.bundle_targets().is_empty() {
            "(no target)".dimmed().to_string()
        } else {
            test.bundle_targets().join(", ")
        };
        println!("{:<36} {targets}", test.name());
    }
}

fn doctor(config_path: Option<&Path>, verbose: bool) -> Result<()> {
    let config = HarnessConfig::load(config_path)?;
    let _logging_guards = init_logging(&log_config(verbose))?;
    let suite = build_suite(&config, SuiteOptions::default())?;
    suite.validate()?;
    println!("{} device ready for debugging", "OK".green().bold());
    Ok(())
}

/// `rdh-run` next to the current executable, else on `PATH`.
fn runner_program() -> Result<PathBuf> {
    let name = format!("{RUNNER_BIN}{}", std::env::consts::EXE_SUFFIX);
    let exe = std::env::current_exe().context("unable to locate the rdh executable")?;
    let sibling = exe.with_file_name(&name);
    if sibling.exists() {
        return Ok(sibling);
    }
    which::which(&name).with_context(|| format!("unable to find {name} next to {}", exe.display()))
}
