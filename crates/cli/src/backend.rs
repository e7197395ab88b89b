//! Backend construction from addresses
//!
//! The scheme of an address picks the backend kind and its account names the
//! alias holding the endpoint and credentials, e.g. `s3://minio/bucket/dir/`.

use std::sync::Arc;

use thiserror::Error;
use vcp_core::{AccountAddress, CloudBackend, Retrying};
use vcp_s3::S3Backend;

use crate::alias::AliasManager;
use crate::config::ConfigError;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Failure while preparing or running a command
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] vcp_core::Error),
}

impl CommandError {
    /// Print the error and return its exit code
    pub fn report(&self, formatter: &Formatter) -> ExitCode {
        match self {
            CommandError::Config(e) => formatter.fail_config(e),
            CommandError::Core(e) => formatter.fail(e),
        }
    }
}

/// Connect to the backend an address refers to
///
/// The returned backend retries transient failures with the alias's retry
/// policy.
pub async fn connect(
    account: &AccountAddress,
    aliases: &AliasManager,
    part_concurrency: usize,
) -> Result<Arc<dyn CloudBackend>, CommandError> {
    match account.scheme.as_str() {
        "s3" => {
            let alias = aliases.get(&account.account)?;
            tracing::debug!(alias = %alias.name, endpoint = %alias.endpoint, "connecting");
            let backend = S3Backend::new(alias.s3_settings(part_concurrency)).await?;
            Ok(Arc::new(Retrying::new(
                Arc::new(backend),
                alias.retry_config().policy(),
            )))
        }
        other => Err(vcp_core::Error::Config(format!(
            "no backend for scheme '{other}' (supported: s3)"
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use tempfile::TempDir;

    fn empty_aliases() -> (AliasManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let manager =
            AliasManager::with_config_manager(ConfigManager::with_path(dir.path().join("c.toml")));
        (manager, dir)
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_usage_error() {
        let (aliases, _dir) = empty_aliases();
        let (account, _) = AccountAddress::split("https://acct.host/c/").unwrap();
        let err = connect(&account, &aliases, 1).await.err().unwrap();
        assert!(matches!(err, CommandError::Core(vcp_core::Error::Config(_))));
        assert_eq!(err.report(&Formatter::default()), ExitCode::UsageError);
    }

    #[tokio::test]
    async fn test_unknown_alias_is_not_found() {
        let (aliases, _dir) = empty_aliases();
        let (account, _) = AccountAddress::split("s3://nowhere/bucket/").unwrap();
        let err = connect(&account, &aliases, 1).await.err().unwrap();
        assert!(matches!(
            err,
            CommandError::Config(ConfigError::AliasNotFound(_))
        ));
        assert_eq!(err.report(&Formatter::default()), ExitCode::NotFound);
    }
}
