//! Application layer: port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain` and `vbmc_common`, never on
//! `crate::infra`, `crate::server`, or `crate::worker`.

pub mod ports;
pub mod services;

pub use ports::{
    BackendProbe, CommandRunner, ConfigStore, PowerBackend, WorkerHandle, WorkerSpawner,
};
