//! vbmc - command-line client of the virtual BMC supervisor

#![cfg_attr(test, allow(clippy::expect_used))]

use clap::Parser;
use vbmc_cli::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match cli.run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
