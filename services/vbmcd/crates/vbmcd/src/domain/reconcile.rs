//! Reconciliation transition table.
//!
//! A worker slot is an explicit state-tagged variant rather than a nullable
//! process reference, so every (desired, observed) pair maps to exactly one
//! [`Transition`] and the table can be tested without spawning anything.

use vbmc_common::BmcStatus;

/// Supervisor-owned view of one instance's worker process.
#[derive(Debug)]
pub enum Worker<H> {
    /// No process has been spawned, or the last one was terminated on purpose.
    NotStarted,
    /// A process was spawned and has not been seen to exit.
    Running(H),
    /// The process exited on its own (or could not be spawned at all).
    Exited(Option<i32>),
}

/// What polling a live handle reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Alive,
    Exited(Option<i32>),
}

/// Observed liveness of a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// No handle.
    Absent,
    /// Handle with a live process.
    Alive,
    /// Handle whose process has exited.
    Dead(Option<i32>),
}

impl Liveness {
    /// Status reported by `list`/`show` for this liveness.
    #[must_use]
    pub fn status(self) -> BmcStatus {
        match self {
            Self::Absent => BmcStatus::Down,
            Self::Alive => BmcStatus::Running,
            Self::Dead(_) => BmcStatus::Error,
        }
    }
}

impl<H> Default for Worker<H> {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl<H> Worker<H> {
    /// Observe the slot, polling a running handle with `poll`.
    ///
    /// A handle seen to have exited is replaced by [`Worker::Exited`] so the
    /// exit code survives until the slot is pruned or respawned.
    pub fn observe(&mut self, poll: impl FnOnce(&mut H) -> ProcessState) -> Liveness {
        let state = match self {
            Self::NotStarted => return Liveness::Absent,
            Self::Exited(code) => return Liveness::Dead(*code),
            Self::Running(handle) => poll(handle),
        };
        match state {
            ProcessState::Alive => Liveness::Alive,
            ProcessState::Exited(code) => {
                *self = Self::Exited(code);
                Liveness::Dead(code)
            }
        }
    }
}

/// Action a reconciliation pass takes for one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Spawn a worker. `restart` is set when a previous process had exited.
    Spawn { restart: bool },
    /// Gracefully terminate the live worker and drop its handle.
    Terminate,
    /// Drop a handle whose process already exited.
    Prune,
    /// Nothing to do.
    Keep,
}

/// Decide the transition for one instance.
#[must_use]
pub fn plan(desired_running: bool, observed: Liveness) -> Transition {
    match (desired_running, observed) {
        (true, Liveness::Absent) => Transition::Spawn { restart: false },
        (true, Liveness::Dead(_)) => Transition::Spawn { restart: true },
        (false, Liveness::Alive) => Transition::Terminate,
        (false, Liveness::Dead(_)) => Transition::Prune,
        (true, Liveness::Alive) | (false, Liveness::Absent) => Transition::Keep,
    }
}
