//! Alias management commands
//!
//! Aliases are named references to S3-compatible storage endpoints,
//! including connection details and credentials.

use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};
use serde::Serialize;

use crate::alias::{Alias, AliasManager};
use crate::config::ConfigError;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

const BUCKET_LOOKUPS: [&str; 3] = ["auto", "path", "dns"];

/// Alias subcommands for managing storage service connections
#[derive(Subcommand, Debug)]
pub enum AliasCommands {
    /// Add or update an alias
    Set(SetArgs),

    /// List all configured aliases
    List(ListArgs),

    /// Remove an alias
    Remove(RemoveArgs),
}

/// Arguments for the `alias set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Alias name, used as the account in s3:// addresses
    pub name: String,

    /// S3 endpoint URL (e.g., "http://localhost:9000", "https://s3.amazonaws.com")
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Bucket lookup style: auto, path, or dns
    #[arg(long, default_value = "auto")]
    pub bucket_lookup: String,
}

/// Arguments for the `alias list` command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Show full details including region and lookup style
    #[arg(short, long)]
    pub long: bool,
}

/// Arguments for the `alias remove` command
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Name of the alias to remove
    pub name: String,
}

/// JSON output for alias list
#[derive(Serialize)]
struct AliasListOutput {
    aliases: Vec<AliasInfo>,
}

/// Alias information for JSON output (without credentials)
#[derive(Serialize)]
struct AliasInfo {
    name: String,
    endpoint: String,
    region: String,
    bucket_lookup: String,
}

impl From<&Alias> for AliasInfo {
    fn from(alias: &Alias) -> Self {
        Self {
            name: alias.name.clone(),
            endpoint: alias.endpoint.clone(),
            region: alias.region.clone(),
            bucket_lookup: alias.bucket_lookup.clone(),
        }
    }
}

/// JSON output for alias set/remove operations
#[derive(Serialize)]
struct AliasOperationOutput {
    success: bool,
    alias: String,
    message: String,
}

/// Execute an alias subcommand
pub async fn execute(cmd: AliasCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let manager = match AliasManager::new() {
        Ok(manager) => manager,
        Err(e) => return formatter.fail_config(&e),
    };

    let result = match cmd {
        AliasCommands::Set(args) => execute_set(args, &manager, &formatter),
        AliasCommands::List(args) => execute_list(&args, &manager, &formatter),
        AliasCommands::Remove(args) => execute_remove(args, &manager, &formatter),
    };
    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => formatter.fail_config(&e),
    }
}

/// Build an alias from `alias set` arguments
pub fn alias_from_args(args: SetArgs) -> Result<Alias, ConfigError> {
    if args.name.is_empty() {
        return Err(ConfigError::Invalid("alias name cannot be empty".into()));
    }
    // The alias is the first host label of an s3:// address
    if args.name.contains(['/', ':', '.']) {
        return Err(ConfigError::Invalid(format!(
            "alias name '{}' cannot contain '/', ':' or '.'",
            args.name
        )));
    }
    if args.endpoint.is_empty() {
        return Err(ConfigError::Invalid("endpoint URL cannot be empty".into()));
    }
    url::Url::parse(&args.endpoint)
        .map_err(|e| ConfigError::Invalid(format!("invalid endpoint '{}': {e}", args.endpoint)))?;
    if !BUCKET_LOOKUPS.contains(&args.bucket_lookup.as_str()) {
        return Err(ConfigError::Invalid(
            "bucket lookup must be 'auto', 'path', or 'dns'".into(),
        ));
    }

    let mut alias = Alias::new(
        args.name.to_lowercase(),
        args.endpoint,
        args.access_key,
        args.secret_key,
    );
    alias.region = args.region;
    alias.bucket_lookup = args.bucket_lookup;
    Ok(alias)
}

fn execute_set(
    args: SetArgs,
    manager: &AliasManager,
    formatter: &Formatter,
) -> Result<(), ConfigError> {
    let alias = alias_from_args(args)?;
    let name = alias.name.clone();
    manager.set(alias)?;

    if formatter.is_json() {
        formatter.json(&AliasOperationOutput {
            success: true,
            message: format!("Alias '{name}' configured successfully"),
            alias: name,
        });
    } else {
        formatter.success(&format!("Alias '{name}' configured successfully."));
    }
    Ok(())
}

fn execute_list(
    args: &ListArgs,
    manager: &AliasManager,
    formatter: &Formatter,
) -> Result<(), ConfigError> {
    let aliases = manager.list()?;

    if formatter.is_json() {
        formatter.json(&AliasListOutput {
            aliases: aliases.iter().map(AliasInfo::from).collect(),
        });
        return Ok(());
    }
    if aliases.is_empty() {
        formatter.println("No aliases configured.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    if args.long {
        table.set_header(vec!["Name", "Endpoint", "Region", "Lookup"]);
        for alias in &aliases {
            table.add_row(vec![
                &alias.name,
                &alias.endpoint,
                &alias.region,
                &alias.bucket_lookup,
            ]);
        }
    } else {
        table.set_header(vec!["Name", "Endpoint"]);
        for alias in &aliases {
            table.add_row(vec![&alias.name, &alias.endpoint]);
        }
    }
    formatter.println(&table.to_string());
    Ok(())
}

fn execute_remove(
    args: RemoveArgs,
    manager: &AliasManager,
    formatter: &Formatter,
) -> Result<(), ConfigError> {
    manager.remove(&args.name)?;

    if formatter.is_json() {
        formatter.json(&AliasOperationOutput {
            success: true,
            message: format!("Alias '{}' removed successfully", args.name),
            alias: args.name,
        });
    } else {
        formatter.success(&format!("Alias '{}' removed successfully.", args.name));
    }
    Ok(())
}
