//! vbmc CLI library, exposed for integration testing.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cli;
pub mod client;
pub mod commands;
pub mod daemon;
pub mod output;
