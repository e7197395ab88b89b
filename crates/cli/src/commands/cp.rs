//! cp command - Copy blobs between backends
//!
//! Copies one blob, or with `-r` every blob below a container, into a
//! destination container. Content is downloaded into the configured cache,
//! uploaded block by block and released again.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use vcp_core::cache::CacheStrategy;
use vcp_core::mapper::{ensure_path, resolve_backend_address};
use vcp_core::{
    copy_blob, AccountAddress, BlobId, CloudBackend, ContainerId, Error, NamespaceMapper,
    TransferConfig, TransferEngine, UploadSummary, VirtualTree,
};

use crate::alias::AliasManager;
use crate::backend::{self, CommandError};
use crate::config::{CacheMode, ConfigManager, TransferSettings};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

/// Copy blobs
#[derive(Args, Debug)]
pub struct CpArgs {
    /// Source blob (s3://alias/container/dir/blob), or container with -r
    pub source: String,

    /// Destination container or virtual directory (must end with '/')
    pub target: String,

    /// Copy every blob below the source container
    #[arg(short, long)]
    pub recursive: bool,

    /// Hold content in memory between download and upload
    #[arg(long, conflicts_with = "cache_dir")]
    pub in_memory: bool,

    /// Spill content to files under DIR between download and upload
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Chunk and block size in bytes
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Blocks staged concurrently per blob
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Keep upload resume state under DIR
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Continue with the next blob when one fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Only show what would be copied
    #[arg(long)]
    pub dry_run: bool,
}

/// One planned blob copy
#[derive(Debug, Clone)]
pub struct CopyItem {
    pub blob: BlobId,
    pub dest: ContainerId,
    /// `container/key` of the source
    pub source: String,
    /// `container/key` the blob will be written to
    pub target: String,
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CpOutput {
    status: &'static str,
    copied: Vec<UploadSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    planned: Vec<PlannedCopy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<FailedCopy>,
    total_bytes: u64,
    total_size_human: String,
}

#[derive(Debug, Serialize)]
struct PlannedCopy {
    source: String,
    target: String,
}

#[derive(Debug, Serialize)]
struct FailedCopy {
    source: String,
    error: String,
}

/// Execute the cp command
pub async fn execute(args: CpArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config.clone());
    match run(&args, &output_config, &formatter).await {
        Ok(code) => code,
        Err(e) => e.report(&formatter),
    }
}

async fn run(
    args: &CpArgs,
    output_config: &OutputConfig,
    formatter: &Formatter,
) -> Result<ExitCode, CommandError> {
    let config = ConfigManager::new()?.load()?;
    let (mut transfer, cache) = transfer_options(args, &config.transfer)?;
    let aliases = AliasManager::new()?;

    let (source_account, _) = AccountAddress::split(&args.source)?;
    let (target_account, _) = AccountAddress::split(&args.target)?;
    let source_mapper = NamespaceMapper::new(
        backend::connect(&source_account, &aliases, transfer.concurrency).await?,
    );
    let target_mapper = NamespaceMapper::new(
        backend::connect(&target_account, &aliases, transfer.concurrency).await?,
    );

    if let Some(message) = drop_unusable_state_dir(&mut transfer, target_mapper.backend().as_ref())
    {
        formatter.warning(&message);
    }

    let mut source_tree = source_mapper.new_tree();
    let mut target_tree = target_mapper.new_tree();
    let items = plan_copies(
        &source_mapper,
        &mut source_tree,
        &args.source,
        args.recursive,
        &target_mapper,
        &mut target_tree,
        &args.target,
    )
    .await?;

    if args.dry_run {
        print_plan(&items, formatter);
        return Ok(ExitCode::Success);
    }

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling transfer");
                cancel.cancel();
            }
        })
    };

    let source_engine = TransferEngine::new(source_mapper.backend().clone(), transfer.clone())
        .with_cancel_token(cancel.clone())
        .with_account(&source_account.account);
    let target_engine = TransferEngine::new(target_mapper.backend().clone(), transfer)
        .with_cancel_token(cancel)
        .with_account(&target_account.account);

    let total: u64 = items.iter().filter_map(|i| i.size).sum();
    let progress = ProgressBar::new(output_config.clone(), total);
    let outcome = run_copies(
        &items,
        &source_engine,
        &mut source_tree,
        &target_engine,
        &target_tree,
        &cache,
        args.continue_on_error,
        &progress,
    )
    .await;
    progress.finish_and_clear();
    watcher.abort();

    Ok(report(outcome, formatter))
}

/// Resolve chunking, concurrency and cache settings from flags and config
///
/// Flags win over the `[transfer]` section.
pub fn transfer_options(
    args: &CpArgs,
    settings: &TransferSettings,
) -> vcp_core::Result<(TransferConfig, CacheStrategy)> {
    let chunk_size = args.chunk_size.unwrap_or(settings.chunk_size);
    if chunk_size == 0 {
        return Err(Error::Config("chunk size must be greater than zero".into()));
    }
    let concurrency = args.concurrency.unwrap_or(settings.concurrency);
    if concurrency == 0 {
        return Err(Error::Config("concurrency must be greater than zero".into()));
    }

    let cache = if args.in_memory {
        CacheStrategy::InMemory
    } else if let Some(dir) = &args.cache_dir {
        CacheStrategy::spill_to(dir)
    } else {
        match settings.cache_mode {
            CacheMode::InMemory => CacheStrategy::InMemory,
            CacheMode::SpillToDisk => {
                let dir = settings.cache_dir.as_ref().ok_or_else(|| {
                    Error::Config("cache_mode spill-to-disk requires cache_dir".into())
                })?;
                CacheStrategy::spill_to(dir)
            }
        }
    };

    let mut config = TransferConfig::new()
        .chunk_size(chunk_size)
        .concurrency(concurrency);
    if let Some(dir) = args.state_dir.as_ref().or(settings.state_dir.as_ref()) {
        config = config.state_dir(dir);
    }
    Ok((config, cache))
}

/// Clear the resume state directory when the target cannot resume uploads
///
/// Returns the warning to show the user when a directory was dropped.
pub fn drop_unusable_state_dir(
    config: &mut TransferConfig,
    target: &dyn CloudBackend,
) -> Option<String> {
    if target.durable_staging() {
        return None;
    }
    let dir = config.state_dir.take()?;
    tracing::warn!(
        state_dir = %dir.display(),
        origin = %target.origin(),
        "target does not keep staged blocks, ignoring state dir"
    );
    Some(format!(
        "Ignoring state dir {}: {} targets cannot resume interrupted uploads",
        dir.display(),
        target.origin()
    ))
}

/// Resolve the source blobs and their destination containers
///
/// The source is resolved first so a missing source never creates the
/// destination container. With `recursive` the source must be a container
/// address and the virtual directories below it are recreated under the
/// target.
pub async fn plan_copies(
    source_mapper: &NamespaceMapper,
    source_tree: &mut VirtualTree,
    source: &str,
    recursive: bool,
    target_mapper: &NamespaceMapper,
    target_tree: &mut VirtualTree,
    target: &str,
) -> vcp_core::Result<Vec<CopyItem>> {
    let sources: Vec<(BlobId, Vec<String>)> = if recursive {
        let container = source_mapper
            .resolve_existing_container(source_tree, source)
            .await?;
        source_mapper.populate(source_tree, container).await?;
        source_tree
            .blob_paths(container)
            .into_iter()
            .map(|(blob, mut path)| {
                path.pop();
                (blob, path)
            })
            .collect()
    } else {
        let blob = source_mapper.resolve_blob(source_tree, source).await?;
        vec![(blob, Vec::new())]
    };

    let root = target_mapper.resolve_container(target_tree, target).await?;
    sources
        .into_iter()
        .map(|(blob, dirs)| {
            let dest = ensure_path(target_tree, root, &dirs);
            let from = resolve_backend_address(source_tree, blob)?;
            let to = resolve_backend_address(target_tree, dest)?;
            let node = source_tree.blob(blob);
            Ok(CopyItem {
                blob,
                dest,
                source: format!("{}/{}", from.container, from.key),
                target: format!("{}/{}{}", to.container, to.key, node.name),
                size: node.size,
            })
        })
        .collect()
}

/// Result of a copy run
#[derive(Debug, Default)]
pub struct CopyOutcome {
    pub copied: Vec<UploadSummary>,
    pub failed: Vec<(String, Error)>,
}

/// Copy every planned item in order
///
/// Stops at the first failure unless `continue_on_error` is set.
/// Cancellation always stops the run.
#[allow(clippy::too_many_arguments)]
pub async fn run_copies(
    items: &[CopyItem],
    source_engine: &TransferEngine,
    source_tree: &mut VirtualTree,
    target_engine: &TransferEngine,
    target_tree: &VirtualTree,
    cache: &CacheStrategy,
    continue_on_error: bool,
    progress: &ProgressBar,
) -> CopyOutcome {
    let mut outcome = CopyOutcome::default();
    for item in items {
        progress.set_message(&item.source);
        let result = copy_blob(
            source_engine,
            source_tree,
            item.blob,
            target_engine,
            target_tree,
            item.dest,
            cache,
        )
        .await;

        match result {
            Ok(summary) => {
                progress.inc(summary.bytes);
                outcome.copied.push(summary);
            }
            Err(e) => {
                tracing::debug!(source = %item.source, error = %e, "copy failed");
                let stop = matches!(e, Error::Cancelled) || !continue_on_error;
                outcome.failed.push((item.source.clone(), e));
                if stop {
                    break;
                }
            }
        }
    }
    outcome
}

fn print_plan(items: &[CopyItem], formatter: &Formatter) {
    if formatter.is_json() {
        let planned = items
            .iter()
            .map(|i| PlannedCopy {
                source: i.source.clone(),
                target: i.target.clone(),
            })
            .collect();
        formatter.json(&CpOutput {
            status: "dry-run",
            copied: Vec::new(),
            planned,
            failed: Vec::new(),
            total_bytes: 0,
            total_size_human: humansize::format_size(0u64, humansize::BINARY),
        });
        return;
    }
    for item in items {
        formatter.println(&format!("{} -> {}", item.source, item.target));
    }
}

fn report(outcome: CopyOutcome, formatter: &Formatter) -> ExitCode {
    let total: u64 = outcome.copied.iter().map(|s| s.bytes).sum();
    let exit_code = outcome
        .failed
        .last()
        .map_or(ExitCode::Success, |(_, e)| ExitCode::from_error(e));

    if formatter.is_json() {
        formatter.json(&CpOutput {
            status: if outcome.failed.is_empty() { "success" } else { "error" },
            failed: outcome
                .failed
                .iter()
                .map(|(source, e)| FailedCopy {
                    source: source.clone(),
                    error: e.to_string(),
                })
                .collect(),
            copied: outcome.copied,
            planned: Vec::new(),
            total_bytes: total,
            total_size_human: humansize::format_size(total, humansize::BINARY),
        });
        return exit_code;
    }

    for (source, e) in &outcome.failed {
        formatter.error(&format!("{source}: {e}"));
    }
    if !outcome.failed.is_empty() && !outcome.copied.is_empty() {
        formatter.warning(&format!(
            "{} blob(s) were not copied",
            outcome.failed.len()
        ));
    }
    if !outcome.copied.is_empty() {
        formatter.success(&format!(
            "Copied {} blob(s), {}",
            outcome.copied.len(),
            humansize::format_size(total, humansize::BINARY)
        ));
    }
    exit_code
}
