//! Infrastructure layer: concrete implementations of application port traits.
//!
//! Filesystem access, process execution and backend CLIs live here. Imports
//! from `crate::domain` and `crate::application::ports` are allowed; imports
//! from `crate::server` or `crate::worker` are not.

pub mod backend;
pub mod command_runner;
pub mod ini;
pub mod pidfile;
pub mod process;
pub mod store;
