//! Application service: the supervisor / reconciler.
//!
//! Desired state is the `enabled` flag in the config store; actual state is
//! the in-memory worker table. Every mutating operation writes desired state
//! and then runs one reconciliation pass before returning, so the caller
//! observes the converged result.
//!
//! The worker table is never persisted. After a restart the supervisor
//! recovers by reconciling from the stored flags alone.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use vbmc_common::{AddOptions, BmcConfig, BmcError, BmcResult, BmcStatus, BmcView};

use crate::application::ports::{BackendProbe, ConfigStore, WorkerHandle, WorkerSpawner};
use crate::domain::{Liveness, Transition, Worker, plan};

/// Tunables for the supervisor.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    /// Upper bound on the `add` pre-flight probe.
    pub probe_timeout: Duration,
    /// Wait after a graceful termination request before killing a worker.
    pub terminate_grace: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(30),
            terminate_grace: Duration::from_secs(5),
        }
    }
}

/// Keeps one worker process per enabled BMC instance.
pub struct Supervisor<S, W, P>
where
    W: WorkerSpawner,
{
    store: S,
    spawner: W,
    probe: P,
    settings: SupervisorSettings,
    workers: HashMap<String, Worker<W::Handle>>,
}

impl<S, W, P> Supervisor<S, W, P>
where
    S: ConfigStore,
    W: WorkerSpawner,
    P: BackendProbe,
{
    pub fn new(store: S, spawner: W, probe: P, settings: SupervisorSettings) -> Self {
        Self {
            store,
            spawner,
            probe,
            settings,
            workers: HashMap::new(),
        }
    }

    /// Read access to the config store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate, probe and persist a new instance. It is always created
    /// disabled.
    ///
    /// # Errors
    ///
    /// `Validation` for missing or contradictory options, `AlreadyExists` on
    /// a name collision, `BackendUnreachable` when the probe fails, or the
    /// store's error if persisting fails.
    pub async fn add(&mut self, options: AddOptions) -> BmcResult<BmcConfig> {
        let config = options.into_config()?;
        if self.store.exists(&config.name) {
            return Err(BmcError::AlreadyExists { name: config.name });
        }

        match tokio::time::timeout(self.settings.probe_timeout, self.probe.probe(&config)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(BmcError::BackendUnreachable(format!(
                    "probe of '{}' timed out after {}s",
                    config.name,
                    self.settings.probe_timeout.as_secs()
                )));
            }
        }

        let name = config.name.clone();
        match self.store.create(config) {
            Ok(created) => {
                info!(name = %name, backend = %created.backend_type(), "BMC instance added");
                Ok(created)
            }
            Err(e @ BmcError::AlreadyExists { .. }) => Err(e),
            Err(e) => {
                if let Err(cleanup) = self.store.delete(&name) {
                    debug!(name = %name, error = %cleanup, "no partial config to remove");
                }
                Err(e)
            }
        }
    }

    /// Stop the instance (best effort) and remove its config.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such config.
    pub async fn delete(&mut self, name: &str) -> BmcResult<()> {
        if let Err(e) = self.stop(name).await {
            warn!(name = %name, error = %e, "stop before delete failed; deleting anyway");
        }
        self.store.delete(name)?;
        // A worker that survived a failed stop is now an orphan.
        self.converge(name, None).await?;
        info!(name = %name, "BMC instance deleted");
        Ok(())
    }

    /// Enable the instance and converge. A no-op when a live worker exists.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such config, `ProcessSpawn` if the worker
    /// could not be started.
    pub async fn start(&mut self, name: &str) -> BmcResult<()> {
        let mut config = self.store.load(name)?;

        if self.workers.contains_key(name) {
            let failures = self.reconcile(false).await?;
            if let Some(e) = spawn_failure(failures, name) {
                return Err(e);
            }
            if self.liveness(name) == Liveness::Alive {
                debug!(name = %name, "worker already running");
                return Ok(());
            }
            config = self.store.load(name)?;
        }

        if !config.enabled {
            config.enabled = true;
            self.store.save(&config)?;
        }

        let failures = self.reconcile(false).await?;
        spawn_failure(failures, name).map_or(Ok(()), Err)
    }

    /// Disable the instance and converge. Stopping a stopped instance is fine.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such config.
    pub async fn stop(&mut self, name: &str) -> BmcResult<()> {
        let mut config = self.store.load(name)?;
        if config.enabled {
            config.enabled = false;
            self.store.save(&config)?;
        }
        self.reconcile(false).await?;
        Ok(())
    }

    /// Every stored instance with its derived status. Order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the names cannot be enumerated.
    pub fn list(&mut self) -> BmcResult<Vec<BmcView>> {
        let mut views = Vec::new();
        for name in self.store.list_names()? {
            match self.store.load(&name) {
                Ok(config) => views.push(self.view(config)),
                // deleted or corrupted between enumeration and load
                Err(e) => debug!(name = %name, error = %e, "skipping instance"),
            }
        }
        Ok(views)
    }

    /// One instance with its derived status.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no such config.
    pub fn show(&mut self, name: &str) -> BmcResult<BmcView> {
        let config = self.store.load(name)?;
        Ok(self.view(config))
    }

    /// Run one reconciliation pass. With `shutdown`, every instance is
    /// treated as disabled so all workers are drained.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the names cannot be enumerated. Spawn
    /// failures are logged, not returned.
    pub async fn periodic(&mut self, shutdown: bool) -> BmcResult<()> {
        let failures = self.reconcile(shutdown).await?;
        if !failures.is_empty() {
            debug!(count = failures.len(), "reconciliation pass had spawn failures");
        }
        Ok(())
    }

    /// Derived status of `name`'s worker slot.
    pub fn status(&mut self, name: &str) -> BmcStatus {
        self.liveness(name).status()
    }

    /// Number of worker slots currently held.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn view(&mut self, config: BmcConfig) -> BmcView {
        let status = self.status(&config.name);
        BmcView { config, status }
    }

    fn liveness(&mut self, name: &str) -> Liveness {
        self.workers
            .get_mut(name)
            .map_or(Liveness::Absent, |w| w.observe(WorkerHandle::poll))
    }

    /// Converge every stored instance, then every orphaned slot. Returns the
    /// spawn failures of this pass.
    async fn reconcile(&mut self, shutdown: bool) -> BmcResult<Vec<BmcError>> {
        let mut failures = Vec::new();
        let mut seen = HashSet::new();

        for name in self.store.list_names()? {
            let desired = if shutdown {
                None
            } else {
                match self.store.load(&name) {
                    Ok(config) => Some(config).filter(|c| c.enabled),
                    Err(e) => {
                        warn!(name = %name, error = %e, "cannot load config; treating as disabled");
                        None
                    }
                }
            };
            if let Err(e) = self.converge(&name, desired).await {
                failures.push(e);
            }
            seen.insert(name);
        }

        let orphans: Vec<String> = self
            .workers
            .keys()
            .filter(|name| !seen.contains(*name))
            .cloned()
            .collect();
        for name in orphans {
            debug!(name = %name, "worker has no config");
            if let Err(e) = self.converge(&name, None).await {
                failures.push(e);
            }
        }

        Ok(failures)
    }

    /// Converge one slot. `desired` carries the config to run, or `None` when
    /// the instance should not be running.
    async fn converge(&mut self, name: &str, desired: Option<BmcConfig>) -> BmcResult<()> {
        let mut worker = self.workers.remove(name).unwrap_or_default();
        let observed = worker.observe(WorkerHandle::poll);

        let (next, result) = match (plan(desired.is_some(), observed), desired) {
            (Transition::Spawn { restart }, Some(config)) => {
                if let Liveness::Dead(code) = observed {
                    warn!(name = %name, exit_code = ?code, restart, "worker is dead; respawning");
                }
                match self.spawner.spawn(&config) {
                    Ok(handle) => {
                        info!(
                            name = %name,
                            backend = %config.backend_type(),
                            pid = ?handle.pid(),
                            address = %config.host_address,
                            port = config.port,
                            "worker started"
                        );
                        (Worker::Running(handle), Ok(()))
                    }
                    Err(e) => {
                        error!(name = %name, error = %e, "worker spawn failed");
                        (Worker::Exited(None), Err(e))
                    }
                }
            }
            (Transition::Terminate, _) => {
                if let Worker::Running(handle) = worker {
                    let pid = handle.pid();
                    match handle.terminate(self.settings.terminate_grace).await {
                        Ok(code) => {
                            info!(name = %name, pid = ?pid, exit_code = ?code, "worker terminated");
                        }
                        Err(e) => error!(name = %name, pid = ?pid, error = %e, "terminating worker failed"),
                    }
                }
                (Worker::NotStarted, Ok(()))
            }
            (Transition::Prune, _) => {
                if let Liveness::Dead(code) = observed {
                    info!(name = %name, exit_code = ?code, "pruning exited worker");
                }
                (Worker::NotStarted, Ok(()))
            }
            (Transition::Keep | Transition::Spawn { .. }, _) => (worker, Ok(())),
        };

        if !matches!(next, Worker::NotStarted) {
            self.workers.insert(name.to_string(), next);
        }
        result
    }
}

/// The spawn failure of `name` among the failures of a reconciliation pass.
fn spawn_failure(failures: Vec<BmcError>, name: &str) -> Option<BmcError> {
    failures
        .into_iter()
        .find(|e| matches!(e, BmcError::ProcessSpawn { name: n, .. } if n == name))
}
