//! Debugger session lifecycle and the remote-attach handshake.
//!
//! The debugger itself is an external capability behind [`DebuggerBackend`]
//! and [`DebuggerSession`]. This module owns the process-wide runtime guard
//! and the linear attach sequence
//! `Idle -> PlatformSelected -> Connected -> TargetCreated -> Attached`.

pub mod lldb;

pub use lldb::LldbDriver;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::errors::{ErrorCode, HarnessError, Result};

/// Platform kind selected before connecting to the device.
pub const REMOTE_PLATFORM: &str = "remote-android";

/// Result of one interpreter command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReturn {
    pub succeeded: bool,
    pub output: String,
    pub error: String,
}

impl CommandReturn {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            output: output.into(),
            error: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            output: String::new(),
            error: error.into(),
        }
    }
}

/// Failure reported by the debugger binding for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct BindingError(pub String);

impl From<&str> for BindingError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Process-wide debugger binding.
pub trait DebuggerBackend {
    type Session: DebuggerSession;

    fn initialize(&self) -> Result<()>;

    fn terminate(&self);

    /// Create a session whose commands run synchronously, one at a time.
    fn create_session(&self) -> Result<Self::Session>;
}

/// One debugger instance. Never shared between tests.
pub trait DebuggerSession {
    fn select_platform(&mut self, kind: &str) -> Result<(), BindingError>;

    fn connect_platform(&mut self, url: &str) -> Result<(), BindingError>;

    /// Create and select an empty target for the attach to fill in.
    fn create_null_target(&mut self) -> Result<(), BindingError>;

    fn attach_to_pid(&mut self, pid: u32) -> Result<(), BindingError>;

    /// Whether the command interpreter is valid and has commands registered.
    fn interpreter_ready(&mut self) -> bool;

    /// Run one command to completion.
    fn handle_command(&mut self, command: &str) -> CommandReturn;

    fn disconnect_platform(&mut self) -> Result<(), BindingError>;

    fn destroy(&mut self);
}

impl<S: DebuggerSession + ?Sized> DebuggerSession for Box<S> {
    fn select_platform(&mut self, kind: &str) -> Result<(), BindingError> {
        (**self).select_platform(kind)
    }

    fn connect_platform(&mut self, url: &str) -> Result<(), BindingError> {
        (**self).connect_platform(url)
    }

    fn create_null_target(&mut self) -> Result<(), BindingError> {
        (**self).create_null_target()
    }

    fn attach_to_pid(&mut self, pid: u32) -> Result<(), BindingError> {
        (**self).attach_to_pid(pid)
    }

    fn interpreter_ready(&mut self) -> bool {
        (**self).interpreter_ready()
    }

    fn handle_command(&mut self, command: &str) -> CommandReturn {
        (**self).handle_command(command)
    }

    fn disconnect_platform(&mut self) -> Result<(), BindingError> {
        (**self).disconnect_platform()
    }

    fn destroy(&mut self) {
        (**self).destroy()
    }
}

/// Position in the attach sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AttachState {
    Idle,
    PlatformSelected,
    Connected,
    TargetCreated,
    Attached,
}

impl fmt::Display for AttachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::PlatformSelected => "platform-selected",
            Self::Connected => "connected",
            Self::TargetCreated => "target-created",
            Self::Attached => "attached",
        };
        f.write_str(name)
    }
}

/// A failed attach step. Terminal for the current test only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("unable to select platform {platform}: {source}")]
    PlatformSelect {
        platform: String,
        source: BindingError,
    },

    #[error("unable to connect to {url}: {source}")]
    Connect { url: String, source: BindingError },

    #[error("unable to create attach target: {source}")]
    CreateTarget { source: BindingError },

    #[error("unable to attach to pid {pid}: {source}")]
    Attach { pid: u32, source: BindingError },
}

impl AttachError {
    /// Last state reached before the failing step.
    pub fn reached(&self) -> AttachState {
        match self {
            Self::PlatformSelect { .. } => AttachState::Idle,
            Self::Connect { .. } => AttachState::PlatformSelected,
            Self::CreateTarget { .. } => AttachState::Connected,
            Self::Attach { .. } => AttachState::TargetCreated,
        }
    }
}

static RUNTIME_LIVE: AtomicBool = AtomicBool::new(false);

/// Guard over the process-wide debugger binding.
///
/// Only one runtime may be live in a process. Dropping the guard terminates
/// the binding, including during unwinding. A hard process exit, such as the
/// runner's watchdog firing, skips the drop and leaves cleanup to the OS.
pub struct DebuggerRuntime<D: DebuggerBackend> {
    backend: D,
}

impl<D: DebuggerBackend> DebuggerRuntime<D> {
    pub fn global_start(backend: D) -> Result<Self> {
        if RUNTIME_LIVE.swap(true, Ordering::SeqCst) {
            return Err(HarnessError::environment(
                ErrorCode::DebuggerUnavailable,
                "the debugger runtime is already started in this process",
            ));
        }
        if let Err(err) = backend.initialize() {
            RUNTIME_LIVE.store(false, Ordering::SeqCst);
            return Err(err);
        }
        debug!("debugger runtime started");
        Ok(Self { backend })
    }

    /// Explicit form of dropping the guard.
    pub fn global_stop(self) {
        drop(self);
    }

    pub fn create_session(&self) -> Result<ManagedSession<D::Session>> {
        let session = self.backend.create_session()?;
        debug!("debugger session created");
        Ok(ManagedSession {
            session: Some(session),
        })
    }

    pub fn destroy_session(&self, session: ManagedSession<D::Session>) {
        drop(session);
    }
}

impl<D: DebuggerBackend> Drop for DebuggerRuntime<D> {
    fn drop(&mut self) {
        self.backend.terminate();
        RUNTIME_LIVE.store(false, Ordering::SeqCst);
        debug!("debugger runtime terminated");
    }
}

/// A session that is destroyed when dropped.
pub struct ManagedSession<S: DebuggerSession> {
    session: Option<S>,
}

impl<S: DebuggerSession> ManagedSession<S> {
    /// Borrow the underlying session.
    ///
    /// `None` only after the session was destroyed, which `Drop` alone does.
    pub fn get(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }
}

impl<S: DebuggerSession> Drop for ManagedSession<S> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.destroy();
            debug!("debugger session destroyed");
        }
    }
}

/// Drives the remote-attach handshake for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSessionController {
    host_port: u16,
}

impl DebugSessionController {
    pub fn new(host_port: u16) -> Self {
        Self { host_port }
    }

    /// Connection string of the forwarded debug-server port.
    pub fn connect_url(&self) -> String {
        format!("connect://localhost:{}", self.host_port)
    }

    /// Walk the attach sequence, stopping at the first failed step.
    pub fn attach_to_remote(
        &self,
        session: &mut dyn DebuggerSession,
        pid: u32,
    ) -> Result<AttachState, AttachError> {
        let mut state = AttachState::Idle;

        session
            .select_platform(REMOTE_PLATFORM)
            .map_err(|source| AttachError::PlatformSelect {
                platform: REMOTE_PLATFORM.to_string(),
                source,
            })?;
        state = advance(state, AttachState::PlatformSelected);

        let url = self.connect_url();
        session
            .connect_platform(&url)
            .map_err(|source| AttachError::Connect {
                url: url.clone(),
                source,
            })?;
        state = advance(state, AttachState::Connected);

        session
            .create_null_target()
            .map_err(|source| AttachError::CreateTarget { source })?;
        state = advance(state, AttachState::TargetCreated);

        session
            .attach_to_pid(pid)
            .map_err(|source| AttachError::Attach { pid, source })?;
        state = advance(state, AttachState::Attached);

        info!(pid, %url, "attached to remote process");
        Ok(state)
    }

    /// Disconnect the platform; failures are logged only.
    pub fn disconnect(&self, session: &mut dyn DebuggerSession) {
        if let Err(err) = session.disconnect_platform() {
            warn!("unable to disconnect platform: {err}");
        }
    }
}

fn advance(from: AttachState, to: AttachState) -> AttachState {
    debug!(%from, %to, "attach step");
    to
}
