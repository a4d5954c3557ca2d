//! Helpers shared by unit and integration tests.

use std::sync::{Mutex, MutexGuard, Once, PoisonError};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static TEST_LOGGING_INIT: Once = Once::new();

static RUNTIME_LOCK: Mutex<()> = Mutex::new(());

/// Route tracing output through the test harness writer.
///
/// Safe to call from every test; only the first call installs a subscriber.
/// `RDH_TEST_LOG_LEVEL` overrides the default `debug` level.
pub fn init_test_logging() {
    TEST_LOGGING_INIT.call_once(|| {
        let level = std::env::var("RDH_TEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let filter = EnvFilter::try_new(format!("rdh_common={level},rdh={level},rdh_run={level}"))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let layer = fmt::layer()
            .with_test_writer()
            .with_target(true)
            .compact();
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init();
    });
}

/// Serializes tests that start a [`crate::debugger::DebuggerRuntime`].
///
/// Only one runtime may be live per process, and the test harness runs tests
/// on parallel threads.
pub fn runtime_test_lock() -> MutexGuard<'static, ()> {
    RUNTIME_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}
