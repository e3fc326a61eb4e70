//! Unit tests for the vbmc CLI
//!
//! These tests use fake transports and run without a supervisor.

mod architecture;
mod commands;
