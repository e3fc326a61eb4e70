//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` runs backend CLIs (`virsh`, `openstack`) with a hard
//! timeout. On timeout the child is killed explicitly rather than left
//! running behind a dropped future.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::application::ports::CommandRunner;

/// Default timeout for one backend CLI invocation.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Production `CommandRunner` with a default timeout and extra environment.
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    timeout: Duration,
    env: Vec<(String, String)>,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            env: Vec::new(),
        }
    }

    /// Set an environment variable on every command this runner starts.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self, program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn collect(mut child: Child, program: &str, timeout: Duration) -> Result<Output> {
        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    read_all(stdout_handle.as_mut()),
                    read_all(stderr_handle.as_mut()),
                );
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(handle: Option<&mut R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let child = self
            .command(program, args)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        Self::collect(child, program, timeout).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        let mut child = self
            .command(program, args)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let stdin_handle = child.stdin.take();
        let input_owned = input.to_vec();
        let stdin_task = tokio::spawn(async move {
            if let Some(mut stdin) = stdin_handle {
                let _ = stdin.write_all(&input_owned).await;
            }
        });

        let output = Self::collect(child, program, self.timeout).await;
        let _ = stdin_task.await;
        output
    }
}

/// Render a failed command's stderr (or stdout when stderr is empty) for an
/// error message.
#[must_use]
pub fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    let text = text.trim();
    if text.is_empty() {
        format!("exited with {}", output.status)
    } else {
        text.to_string()
    }
}
