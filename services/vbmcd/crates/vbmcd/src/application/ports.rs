//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `vbmc_common`.

use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use vbmc_common::{BmcConfig, BmcResult};

use crate::domain::{BootDevice, PowerAction, PowerState, ProcessState};

// ── Config Store Port ─────────────────────────────────────────────────────────

/// Durable storage of BMC instance configs. Pure data access.
pub trait ConfigStore {
    /// True iff a complete, well-formed record is present.
    fn exists(&self, name: &str) -> bool;

    /// Persist a new record.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if a record for the name is present. A failure after
    /// partial creation is not rolled back; the caller removes the remains.
    fn create(&self, config: BmcConfig) -> BmcResult<BmcConfig>;

    /// # Errors
    ///
    /// `NotFound` if absent, `InvalidConfig` if unreadable or incomplete.
    fn load(&self, name: &str) -> BmcResult<BmcConfig>;

    /// Overwrite the full record.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record vanished.
    fn save(&self, config: &BmcConfig) -> BmcResult<()>;

    /// # Errors
    ///
    /// `NotFound` if absent.
    fn delete(&self, name: &str) -> BmcResult<()>;

    /// Names of all well-formed records. Malformed entries are skipped.
    fn list_names(&self) -> BmcResult<Vec<String>>;
}

// ── Worker Process Ports ──────────────────────────────────────────────────────

/// Starts worker processes.
pub trait WorkerSpawner {
    type Handle: WorkerHandle;

    /// Spawn a worker bound to `config`.
    ///
    /// # Errors
    ///
    /// `ProcessSpawn` if the OS refuses to start the process.
    fn spawn(&self, config: &BmcConfig) -> BmcResult<Self::Handle>;
}

/// A spawned worker process.
#[allow(async_fn_in_trait)]
pub trait WorkerHandle {
    /// OS process id, while known.
    fn pid(&self) -> Option<u32>;

    /// Non-blocking liveness check.
    fn poll(&mut self) -> ProcessState;

    /// Request graceful termination, escalating to a kill after `grace`.
    /// Resolves once the exit has been observed.
    async fn terminate(self, grace: Duration) -> Result<Option<i32>>;
}

// ── Backend Ports ─────────────────────────────────────────────────────────────

/// Pre-flight reachability check run by `add` before persisting.
#[allow(async_fn_in_trait)]
pub trait BackendProbe {
    /// # Errors
    ///
    /// `BackendUnreachable` if the backend cannot be reached or the target
    /// does not exist.
    async fn probe(&self, config: &BmcConfig) -> BmcResult<()>;
}

/// Power and boot-device control of one backend target.
#[allow(async_fn_in_trait)]
pub trait PowerBackend {
    async fn get_power_state(&self) -> Result<PowerState>;
    async fn set_power_state(&self, action: PowerAction) -> Result<()>;
    /// `None` when the target has no boot override.
    async fn get_boot_device(&self) -> Result<Option<BootDevice>>;
    async fn set_boot_device(&self, device: BootDevice) -> Result<()>;
    async fn pulse_diagnostic_interrupt(&self) -> Result<()>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so backend CLIs can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output>;
}
