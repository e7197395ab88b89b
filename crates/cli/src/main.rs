//! vcp - virtual-tree blob copier
//!
//! Copies blobs between cloud object stores, treating `/`-separated keys
//! as virtual directories.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vcp_cli::commands::{self, Cli};
use vcp_cli::exit_code::ExitCode;

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.debug) {
        eprintln!("Error: {e:#}");
        std::process::exit(ExitCode::GeneralError.as_i32());
    }

    let exit_code = commands::execute(cli).await;
    std::process::exit(exit_code.as_i32());
}
