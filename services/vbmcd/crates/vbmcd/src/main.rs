//! vbmcd: supervisor of emulated BMC workers.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use vbmc_common::AppConfig;
use vbmcd::worker::{self, WorkerOptions};

#[derive(Parser)]
#[command(name = "vbmcd", version, about = "Supervisor of emulated BMC workers")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the supervisor in the foreground (default)
    Serve,

    /// Run a single BMC worker (spawned by the supervisor)
    #[command(name = "_worker", hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args)]
struct WorkerArgs {
    /// BMC instance name
    name: String,

    /// Config store root
    #[arg(long)]
    config_dir: PathBuf,

    /// Receive timeout of the IPMI listener, in seconds
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    session_timeout: u64,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        tracing::error!(error = %format!("{e:#}"), "vbmcd failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load()?;
    let _guard = vbmcd::logging::init(&config.log)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => vbmcd::serve(config).await,
        Command::Worker(args) => {
            worker::run(WorkerOptions {
                name: args.name,
                config_dir: args.config_dir,
                session_timeout: Duration::from_secs(args.session_timeout),
            })
            .await
        }
    }
}
