//! Application services: use-case orchestration.
//!
//! Services import only from `crate::domain` and `crate::application::ports`.

pub mod supervisor;

pub use supervisor::{Supervisor, SupervisorSettings};
