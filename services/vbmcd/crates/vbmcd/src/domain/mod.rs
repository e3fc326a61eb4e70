//! Domain layer: pure types and decision tables.
//!
//! This module has zero imports from `crate::infra`, `crate::application`,
//! `tokio`, `std::fs`, `std::process`, or `std::net`.

pub mod power;
pub mod reconcile;

pub use power::{BootDevice, ChassisControl, PowerAction, PowerState};
pub use reconcile::{Liveness, ProcessState, Transition, Worker, plan};
