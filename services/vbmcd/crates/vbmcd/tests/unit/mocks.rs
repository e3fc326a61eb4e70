//! Shared fakes for the supervisor's ports.
//!
//! Worker "processes" are entries in a shared table so tests can kill them
//! behind the supervisor's back and count how many are alive.

#![allow(clippy::expect_used, dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use vbmc_common::{AddOptions, BmcConfig, BmcError, BmcResult};
use vbmcd::application::ports::{BackendProbe, WorkerHandle, WorkerSpawner};
use vbmcd::application::services::{Supervisor, SupervisorSettings};
use vbmcd::domain::ProcessState;
use vbmcd::infra::store::IniConfigStore;

// ── Fake workers ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FakeProcess {
    pub name: String,
    pub pid: u32,
    pub alive: bool,
}

#[derive(Debug, Default)]
pub struct Processes {
    pub all: Vec<FakeProcess>,
    /// Names whose spawn fails.
    pub broken: HashSet<String>,
    /// Spawn calls per name, failed ones included.
    pub attempts: HashMap<String, usize>,
}

/// Spawner whose processes live in a shared table.
#[derive(Clone, Default)]
pub struct FakeSpawner {
    pub processes: Rc<RefCell<Processes>>,
}

impl FakeSpawner {
    /// Live processes for `name`.
    pub fn live(&self, name: &str) -> usize {
        self.processes
            .borrow()
            .all
            .iter()
            .filter(|p| p.name == name && p.alive)
            .count()
    }

    /// Total spawns for `name`, dead or alive.
    pub fn spawned(&self, name: &str) -> usize {
        self.processes
            .borrow()
            .all
            .iter()
            .filter(|p| p.name == name)
            .count()
    }

    /// Spawn calls for `name`, successful or not.
    pub fn attempts(&self, name: &str) -> usize {
        self.processes.borrow().attempts.get(name).copied().unwrap_or(0)
    }

    /// Kill every live process of `name` without telling the supervisor.
    pub fn kill(&self, name: &str) {
        for p in &mut self.processes.borrow_mut().all {
            if p.name == name {
                p.alive = false;
            }
        }
    }

    pub fn break_spawn(&self, name: &str) {
        self.processes.borrow_mut().broken.insert(name.to_string());
    }

    pub fn fix_spawn(&self, name: &str) {
        self.processes.borrow_mut().broken.remove(name);
    }
}

impl WorkerSpawner for FakeSpawner {
    type Handle = FakeHandle;

    fn spawn(&self, config: &BmcConfig) -> BmcResult<FakeHandle> {
        let mut processes = self.processes.borrow_mut();
        *processes.attempts.entry(config.name.clone()).or_default() += 1;
        if processes.broken.contains(&config.name) {
            return Err(BmcError::ProcessSpawn {
                name: config.name.clone(),
                reason: "exec format error".into(),
            });
        }
        let pid = 1000 + u32::try_from(processes.all.len()).expect("pid");
        processes.all.push(FakeProcess {
            name: config.name.clone(),
            pid,
            alive: true,
        });
        Ok(FakeHandle {
            pid,
            processes: Rc::clone(&self.processes),
        })
    }
}

pub struct FakeHandle {
    pid: u32,
    processes: Rc<RefCell<Processes>>,
}

impl FakeHandle {
    fn set_alive(&self, alive: bool) {
        if let Some(p) = self
            .processes
            .borrow_mut()
            .all
            .iter_mut()
            .find(|p| p.pid == self.pid)
        {
            p.alive = alive;
        }
    }

    fn is_alive(&self) -> bool {
        self.processes
            .borrow()
            .all
            .iter()
            .any(|p| p.pid == self.pid && p.alive)
    }
}

impl WorkerHandle for FakeHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn poll(&mut self) -> ProcessState {
        if self.is_alive() {
            ProcessState::Alive
        } else {
            ProcessState::Exited(Some(137))
        }
    }

    async fn terminate(self, _grace: Duration) -> Result<Option<i32>> {
        self.set_alive(false);
        Ok(Some(0))
    }
}

// ── Fake probe ────────────────────────────────────────────────────────────────

/// Probe that fails for the listed domains or hangs when asked to.
#[derive(Default)]
pub struct FakeProbe {
    pub unreachable: bool,
    pub hang: bool,
}

impl BackendProbe for FakeProbe {
    async fn probe(&self, config: &BmcConfig) -> BmcResult<()> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.unreachable {
            return Err(BmcError::BackendUnreachable(format!(
                "cannot reach backend of '{}'",
                config.name
            )));
        }
        Ok(())
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

pub type TestSupervisor = Supervisor<IniConfigStore, FakeSpawner, FakeProbe>;

/// Supervisor over a fresh temporary store. Keep the `TempDir` alive.
pub fn supervisor(probe: FakeProbe) -> (TestSupervisor, FakeSpawner, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let spawner = FakeSpawner::default();
    let settings = SupervisorSettings {
        probe_timeout: Duration::from_millis(200),
        terminate_grace: Duration::from_millis(10),
    };
    let sup = Supervisor::new(
        IniConfigStore::new(dir.path()),
        spawner.clone(),
        probe,
        settings,
    );
    (sup, spawner, dir)
}

pub fn hypervisor(name: &str) -> AddOptions {
    AddOptions {
        name: Some(name.into()),
        backend_type: Some("hypervisor".into()),
        uri: Some("qemu:///system".into()),
        domain_name: Some("vm1".into()),
        ..AddOptions::default()
    }
}

pub fn bare_metal(name: &str) -> AddOptions {
    AddOptions {
        name: Some(name.into()),
        backend_type: Some("ironic".into()),
        ..AddOptions::default()
    }
}
