//! Core of the Remote Debug Harness.
//!
//! Runs scripted debugger sessions against RenderScript apps on a single
//! attached Android device. The `rdh` binary orchestrates a suite; each test
//! runs in a fresh `rdh-run` process so a crashed or hung debugger never
//! leaks into the next test.

pub mod bundle;
pub mod config;
pub mod debugger;
pub mod device;
pub mod errors;
pub mod logging;
pub mod mock;
pub mod runner;
pub mod scenario;
pub mod suite;
pub mod testing;

pub use bundle::{TargetKind, TargetRegistry, TestBundle};
pub use config::HarnessConfig;
pub use debugger::{
    DebugSessionController, DebuggerBackend, DebuggerRuntime, DebuggerSession, LldbDriver,
};
pub use device::{AdbBridge, Bridge, DebugServer, RemoteDevice, RemoteProcessHandle};
pub use errors::{ErrorCode, HarnessError, Result};
pub use logging::{LogConfig, LoggingGuards, init_logging};
pub use runner::{RunnerOutcome, TestRunner, Watchdog};
pub use scenario::{DebugTest, TestSpec};
pub use suite::{
    IsolatedLauncher, ProcessLauncher, ResultBook, Suite, SuiteOptions, Summary, TestOutcome,
};
