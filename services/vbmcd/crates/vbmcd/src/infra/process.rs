//! Worker processes: spawning `vbmcd _worker` and signalling it.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tracing::{debug, warn};
use vbmc_common::{BmcConfig, BmcError, BmcResult};

use crate::application::ports::{WorkerHandle, WorkerSpawner};
use crate::domain::ProcessState;

/// Hidden subcommand that runs one worker.
pub const WORKER_SUBCOMMAND: &str = "_worker";

/// Spawns workers by re-executing the supervisor binary.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    config_dir: PathBuf,
    session_timeout: Duration,
}

impl ProcessSpawner {
    #[must_use]
    pub fn new(program: PathBuf, config_dir: PathBuf, session_timeout: Duration) -> Self {
        Self {
            program,
            config_dir,
            session_timeout,
        }
    }

    /// Spawner that re-executes the running binary.
    pub fn current_exe(config_dir: PathBuf, session_timeout: Duration) -> Result<Self> {
        let program = std::env::current_exe().context("cannot locate the vbmcd executable")?;
        Ok(Self::new(program, config_dir, session_timeout))
    }

    /// Arguments passed to the worker for `name`.
    #[must_use]
    pub fn worker_args(&self, name: &str) -> Vec<String> {
        vec![
            WORKER_SUBCOMMAND.to_string(),
            name.to_string(),
            "--config-dir".to_string(),
            self.config_dir.display().to_string(),
            "--session-timeout".to_string(),
            self.session_timeout.as_secs().to_string(),
        ]
    }
}

impl WorkerSpawner for ProcessSpawner {
    type Handle = ChildHandle;

    fn spawn(&self, config: &BmcConfig) -> BmcResult<ChildHandle> {
        let child = Command::new(&self.program)
            .args(self.worker_args(&config.name))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BmcError::ProcessSpawn {
                name: config.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(ChildHandle {
            name: config.name.clone(),
            child,
        })
    }
}

/// A running worker child process.
#[derive(Debug)]
pub struct ChildHandle {
    name: String,
    child: Child,
}

impl ChildHandle {
    /// Wrap an already spawned child.
    #[must_use]
    pub fn new(name: impl Into<String>, child: Child) -> Self {
        Self {
            name: name.into(),
            child,
        }
    }
}

impl WorkerHandle for ChildHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn poll(&mut self) -> ProcessState {
        match self.child.try_wait() {
            Ok(None) => ProcessState::Alive,
            Ok(Some(status)) => ProcessState::Exited(status.code()),
            Err(e) => {
                warn!(name = %self.name, error = %e, "cannot poll worker; assuming exited");
                ProcessState::Exited(None)
            }
        }
    }

    async fn terminate(mut self, grace: Duration) -> Result<Option<i32>> {
        if let Some(pid) = self.child.id() {
            if let Err(e) = send_sigterm(pid) {
                debug!(name = %self.name, pid, error = %e, "SIGTERM failed; killing");
            }
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => Ok(status.context("waiting for worker")?.code()),
            Err(_) => {
                warn!(name = %self.name, grace_secs = grace.as_secs(), "worker ignored SIGTERM; killing");
                self.child.kill().await.context("killing worker")?;
                Ok(self.child.wait().await.context("waiting for worker")?.code())
            }
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let pid = i32::try_from(pid).context("pid out of range")?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).context("sending SIGTERM")?;
    Ok(())
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> Result<()> {
    anyhow::bail!("graceful termination is not supported on this platform")
}

/// Whether a process with `pid` exists.
#[cfg(unix)]
#[must_use]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    matches!(kill(Pid::from_raw(pid), None::<Signal>), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
#[must_use]
pub fn is_process_alive(_pid: u32) -> bool {
    false
}

/// Ask the kernel to SIGTERM this process when its parent dies.
#[cfg(target_os = "linux")]
pub fn die_with_parent() -> Result<()> {
    use nix::sys::signal::Signal;
    nix::sys::prctl::set_pdeathsig(Signal::SIGTERM).context("setting parent-death signal")?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn die_with_parent() -> Result<()> {
    Ok(())
}
