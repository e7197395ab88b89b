//! CLI command definitions and execution
//!
//! Each command lives in its own module with an `Args` struct and an
//! `execute` function returning an [`ExitCode`].

use clap::{Parser, Subcommand};

use crate::config::ConfigManager;
use crate::exit_code::ExitCode;
use crate::output::OutputConfig;

pub mod alias;
pub mod completions;
pub mod cp;
pub mod ls;

/// vcp - virtual-tree blob copier
///
/// Lists and copies blobs between cloud object stores, presenting the
/// `/`-separated keys of each container as a tree of virtual directories.
#[derive(Parser, Debug)]
#[command(name = "vcp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage storage service aliases
    #[command(subcommand)]
    Alias(alias::AliasCommands),

    /// List containers or the virtual tree below one
    Ls(ls::LsArgs),

    /// Copy blobs between containers and backends
    Cp(cp::CpArgs),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

impl Cli {
    /// Output settings from the global flags
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            no_progress: self.no_progress,
            quiet: self.quiet,
        }
    }
}

/// Execute the CLI command and return an exit code
///
/// The `[defaults]` section of the config file fills in output flags not
/// given on the command line. A config file that fails to load is reported
/// by the command itself.
pub async fn execute(cli: Cli) -> ExitCode {
    let mut output_config = cli.output_config();
    if let Ok(config) = ConfigManager::new().and_then(|m| m.load()) {
        output_config.apply_defaults(&config.defaults);
    }

    match cli.command {
        Commands::Alias(cmd) => alias::execute(cmd, output_config).await,
        Commands::Ls(args) => ls::execute(args, output_config).await,
        Commands::Cp(args) => cp::execute(args, output_config).await,
        Commands::Completions(args) => completions::execute(args),
    }
}
