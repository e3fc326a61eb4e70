//! Starting vbmcd on demand.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use vbmc_common::{Request, Response};

use crate::client::{ClientError, Transport};

/// Name of the supervisor binary.
const VBMCD: &str = "vbmcd";

/// Starts the supervisor in the background.
pub trait Launcher {
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn launch(&self) -> Result<()>;
}

/// Spawns `vbmcd serve` detached from the terminal.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Prefer a `vbmcd` installed next to this binary, else search `PATH`.
    #[must_use]
    pub fn discover() -> Self {
        let sibling = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(format!("{VBMCD}{}", std::env::consts::EXE_SUFFIX))))
            .filter(|path| path.is_file());
        Self::new(sibling.unwrap_or_else(|| PathBuf::from(VBMCD)))
    }
}

impl Launcher for ProcessLauncher {
    // `serve` keeps running after the CLI exits; nothing waits on it.
    #[allow(clippy::zombie_processes)]
    fn launch(&self) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            cmd.process_group(0);
        }
        cmd.spawn()
            .with_context(|| format!("failed to start {}", self.program.display()))?;
        Ok(())
    }
}

/// [`Transport`] that starts vbmcd once when nothing is listening.
pub struct AutoLaunch<T, L> {
    inner: T,
    launcher: L,
    wait: Duration,
    enabled: bool,
}

impl<T, L> AutoLaunch<T, L> {
    pub fn new(inner: T, launcher: L, wait: Duration, enabled: bool) -> Self {
        Self {
            inner,
            launcher,
            wait,
            enabled,
        }
    }
}

impl<T: Transport, L: Launcher> Transport for AutoLaunch<T, L> {
    async fn exchange(&self, request: &Request) -> Result<Response, ClientError> {
        match self.inner.exchange(request).await {
            Err(ClientError::Connect { addr, reason }) if self.enabled => {
                self.launcher.launch().map_err(|e| ClientError::Connect {
                    addr,
                    reason: format!("{reason}; {e:#}"),
                })?;
                tokio::time::sleep(self.wait).await;
                self.inner.exchange(request).await
            }
            other => other,
        }
    }
}
