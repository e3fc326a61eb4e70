//! CLI argument parsing with clap derive

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vbmc_common::{AppConfig, Request};

use crate::client::RpcClient;
use crate::commands::{self, AddArgs};
use crate::daemon::{AutoLaunch, ProcessLauncher};
use crate::output::OutputContext;

/// Manage virtual BMCs backed by hypervisor guests or bare-metal nodes
#[derive(Parser)]
#[command(
    name = "vbmc",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Print the response document as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Do not start vbmcd when it is not running
    #[arg(long, global = true)]
    pub no_daemon: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new virtual BMC (disabled until started)
    Add(AddArgs),

    /// Stop and remove virtual BMCs
    Delete {
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },

    /// Enable virtual BMCs and start their workers
    Start {
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },

    /// Disable virtual BMCs and stop their workers
    Stop {
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },

    /// List all virtual BMCs
    List,

    /// Show the configuration of one virtual BMC
    Show { name: String },
}

impl Command {
    /// The RPC request this command sends.
    #[must_use]
    pub fn into_request(self) -> Request {
        match self {
            Self::Add(args) => Request::Add(args.into_options()),
            Self::Delete { names } => Request::Delete { names },
            Self::Start { names } => Request::Start { names },
            Self::Stop { names } => Request::Stop { names },
            Self::List => Request::List,
            Self::Show { name } => Request::Show { name },
        }
    }
}

impl Cli {
    /// Execute the command and return the process exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded.
    pub async fn run(self) -> Result<i32> {
        let Cli {
            json,
            quiet,
            no_color,
            no_daemon,
            command,
        } = self;
        let config = AppConfig::load().context("loading vbmc configuration")?;
        let addr = config.server_addr().context("resolving vbmcd address")?;

        let ctx = OutputContext::new(no_color, quiet);
        let client = RpcClient::new(addr, config.response_timeout());
        let transport = AutoLaunch::new(client, ProcessLauncher::discover(), config.spawn_wait(), !no_daemon);
        Ok(commands::run(&ctx, &transport, command.into_request(), json).await)
    }
}
