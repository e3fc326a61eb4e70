//! Single-instance guard for the supervisor.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::infra::process::is_process_alive;

/// Pid file held for the lifetime of the supervisor; removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claim `path` for the current process.
    ///
    /// # Errors
    ///
    /// Fails if the file names another live process, or cannot be written.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(pid) = read_pid(path) {
            if pid != std::process::id() && is_process_alive(pid) {
                bail!(
                    "vbmcd is already running (pid {pid}, pid file {})",
                    path.display()
                );
            }
            debug!(pid, path = %path.display(), "removing stale pid file");
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let temp_path = path.with_extension("pid.tmp");
        std::fs::write(&temp_path, format!("{}\n", std::process::id()))
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;
        std::fs::rename(&temp_path, path)
            .with_context(|| format!("finalizing pid file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if read_pid(&self.path) == Some(std::process::id()) {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "cannot remove pid file");
            }
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}
