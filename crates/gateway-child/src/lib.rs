//! Orchestrator child process supervision.
//!
//! Spawns the configured orchestrator command, exposes its stdin/stdout as
//! byte streams for framing upstream, and provides graceful shutdown plus
//! (for shared-persistent sessions) backoff-and-respawn on unexpected exit.
//!
//! # Interior Mutability
//!
//! Following the same hybrid mutex split used elsewhere in this codebase:
//! short-lived state lives behind `std::sync::Mutex`, anything that must be
//! held across an `.await` point lives behind `tokio::sync::Mutex`.

use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Errors from spawning or supervising an orchestrator process.
#[derive(Debug, Error)]
pub enum ChildError {
    #[error("command must not be empty")]
    EmptyCommand,

    #[error("failed to spawn process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("child process has no {0} handle")]
    MissingHandle(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Static configuration for the orchestrator child process.
#[derive(Debug, Clone)]
pub struct ChildConfig {
    pub command: String,
    pub args: Vec<String>,
    /// How long to wait after a graceful kill request before forcing.
    pub shutdown_grace: Duration,
    /// Backoff applied between respawn attempts in shared mode.
    pub respawn_backoff: BackoffPolicy,
}

/// Exponential backoff bounds for shared-mode respawn.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn next(&self, current: Duration) -> Duration {
        std::cmp::min(current * 2, self.max)
    }
}

/// A running orchestrator process with its stdio handles detached for
/// direct use by the bridge layer.
pub struct ChildHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    state: StdMutex<ChildState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildState {
    Running,
    ShuttingDown,
    Exited,
}

impl ChildHandle {
    /// Spawn the orchestrator process with piped stdio.
    ///
    /// # Errors
    /// Returns [`ChildError::EmptyCommand`] if the command is blank, or
    /// [`ChildError::SpawnFailed`] if the OS refuses to start the process.
    pub fn spawn(cfg: &ChildConfig) -> Result<Self, ChildError> {
        if cfg.command.trim().is_empty() {
            return Err(ChildError::EmptyCommand);
        }

        info!(command = %cfg.command, args = ?cfg.args, "spawning orchestrator child process");

        let mut command = Command::new(&cfg.command);
        command
            .args(&cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(ChildError::SpawnFailed)?;

        let stdin = child
            .stdin
            .take()
            .ok_or(ChildError::MissingHandle("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(ChildError::MissingHandle("stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr));
        }

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            state: StdMutex::new(ChildState::Running),
        })
    }

    /// Take ownership of the stdin handle. Returns `None` if already taken.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Take ownership of the stdout handle. Returns `None` if already taken.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the process is still believed to be running, without
    /// blocking. Reaps the exit status as a side effect if it has exited.
    pub fn try_is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for the process to exit on its own.
    ///
    /// # Errors
    /// Returns [`ChildError::Io`] if the OS wait call fails.
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus, ChildError> {
        let status = self.child.wait().await?;
        *self.state.lock().expect("state mutex poisoned") = ChildState::Exited;
        Ok(status)
    }

    /// Ask the process to exit, waiting up to `grace` before forcing.
    ///
    /// # Errors
    /// Returns [`ChildError::Io`] if the final wait after a forced kill
    /// fails.
    pub async fn kill_gracefully(
        &mut self,
        grace: Duration,
    ) -> Result<std::process::ExitStatus, ChildError> {
        *self.state.lock().expect("state mutex poisoned") = ChildState::ShuttingDown;

        if let Err(e) = self.child.start_kill() {
            warn!(error = %e, "failed to send termination signal to child");
        }

        match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                *self.state.lock().expect("state mutex poisoned") = ChildState::Exited;
                Ok(status)
            }
            Ok(Err(e)) => Err(ChildError::Io(e)),
            Err(_) => {
                warn!("child process did not exit within grace period, forcing kill");
                self.child.kill().await?;
                let status = self.child.wait().await?;
                *self.state.lock().expect("state mutex poisoned") = ChildState::Exited;
                Ok(status)
            }
        }
    }
}

async fn log_stderr(stderr: tokio::process::ChildStderr) {
    use tokio::io::{AsyncBufReadExt, BufReader};
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "gateway_child::stderr", "{line}"),
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed reading child stderr");
                break;
            }
        }
    }
}
