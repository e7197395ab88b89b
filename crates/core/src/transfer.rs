//! Transfer engine
//!
//! Downloads blob content from a backend into a cache, and uploads cached
//! content to a backend with the stage-block / commit-block-list protocol.
//! Block ids are content addressed, and blocks are staged through a bounded
//! in-order pipeline so the committed list always follows chunk order.
//!
//! A commit is issued only after every chunk was staged. Staging failures,
//! read failures and cancellation all return before the commit. Blocks left
//! behind by a failed upload are discarded unless resume state tracks them.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{FuturesOrdered, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::cache::{self, CacheSink, CacheSource, CacheStrategy};
use crate::error::{Error, Result};
use crate::mapper::{resolve_backend_address, BackendAddress};
use crate::resume::UploadState;
use crate::traits::{BoxedReader, CloudBackend};
use crate::tree::{BlobId, CachedContent, ContainerId, VirtualTree};

/// Default chunk size: 100 KiB
pub const DEFAULT_CHUNK_SIZE: usize = 100 * 1024;

/// Default number of blocks staged concurrently for one blob
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Transfer engine configuration
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Chunk (and block) size in bytes
    pub chunk_size: usize,

    /// Maximum number of blocks in flight per upload
    pub concurrency: usize,

    /// Directory for upload resume state
    pub state_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            state_dir: None,
        }
    }
}

impl TransferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn state_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(path.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be greater than zero".into()));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Content-addressed block id: hex SHA-256 of the chunk
pub fn block_id(chunk: &[u8]) -> String {
    hex::encode(Sha256::digest(chunk))
}

/// Outcome of a committed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub container: String,
    pub key: String,
    pub bytes: u64,
    /// Block ids in commit order
    pub block_ids: Vec<String>,
    /// Blocks skipped because a previous attempt had staged them
    pub resumed_blocks: usize,
}

type StagedBlock = Result<(String, usize)>;

/// Moves blob content between a backend and a local cache
pub struct TransferEngine {
    backend: Arc<dyn CloudBackend>,
    config: TransferConfig,
    cancel: CancellationToken,
    account: Option<String>,
}

impl TransferEngine {
    /// Create an engine over an already constructed backend client
    pub fn new(backend: Arc<dyn CloudBackend>, config: TransferConfig) -> Self {
        Self {
            backend,
            config,
            cancel: CancellationToken::new(),
            account: None,
        }
    }

    /// Name the account the backend serves, keeping spill files of
    /// same-named containers in different accounts apart
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Observe `token`; raising it stops transfers with [`Error::Cancelled`]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn backend(&self) -> &Arc<dyn CloudBackend> {
        &self.backend
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Download a blob into `cache`, storing the result on the blob node
    ///
    /// Returns the number of bytes cached. On failure the blob holds no
    /// content and any partial spill file has been removed.
    pub async fn download(
        &self,
        tree: &mut VirtualTree,
        blob: BlobId,
        cache: &CacheStrategy,
    ) -> Result<u64> {
        self.config.validate()?;
        let address = resolve_backend_address(tree, blob)?;
        let virtual_path = match &self.account {
            Some(account) => format!(
                "{}/{account}/{}/{}",
                tree.origin(),
                address.container,
                address.key
            ),
            None => format!("{}/{}/{}", tree.origin(), address.container, address.key),
        };

        let previous = std::mem::take(&mut tree.blob_mut(blob).content);
        cache::discard(previous).await?;
        self.check_cancelled()?;

        let mut reader = self
            .backend
            .open_read_stream(&address.container, &address.key)
            .await?;
        let mut sink = cache.open_sink(&virtual_path).await?;

        match self.fill_sink(&mut reader, &mut sink, &address).await {
            Ok(total) => {
                let content = sink.finish().await?;
                tree.blob_mut(blob).content = content;
                tracing::info!(
                    container = %address.container,
                    key = %address.key,
                    bytes = total,
                    "downloaded blob"
                );
                Ok(total)
            }
            Err(e) => {
                sink.abort().await;
                Err(e)
            }
        }
    }

    async fn fill_sink(
        &self,
        reader: &mut BoxedReader,
        sink: &mut CacheSink,
        address: &BackendAddress,
    ) -> Result<u64> {
        let mut buf = vec![0u8; self.config.chunk_size];
        let mut total = 0u64;
        loop {
            self.check_cancelled()?;
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                read = reader.read(&mut buf) => read,
            };
            let n = read.map_err(|e| {
                Error::PartialTransfer(format!(
                    "reading {}/{} failed after {total} bytes: {e}",
                    address.container, address.key
                ))
            })?;
            if n == 0 {
                return Ok(total);
            }
            sink.write_chunk(&buf[..n]).await?;
            total += n as u64;
            tracing::debug!(key = %address.key, chunk = n, total, "cached chunk");
        }
    }

    /// Upload a downloaded blob into `dest_container`
    ///
    /// The destination key is the container's virtual prefix followed by the
    /// source blob's name.
    pub async fn upload(
        &self,
        dest_tree: &VirtualTree,
        dest_container: ContainerId,
        src_tree: &VirtualTree,
        src_blob: BlobId,
    ) -> Result<UploadSummary> {
        let prefix = resolve_backend_address(dest_tree, dest_container)?;
        let blob = src_tree.blob(src_blob);
        let key = format!("{}{}", prefix.key, blob.name);
        self.upload_content(&prefix.container, &key, &blob.content)
            .await
    }

    /// Upload cached content to an explicit backend container and key
    pub async fn upload_content(
        &self,
        container: &str,
        key: &str,
        content: &CachedContent,
    ) -> Result<UploadSummary> {
        self.config.validate()?;
        let target = format!("{container}/{key}");
        let mut source = CacheSource::open(content)
            .await?
            .ok_or_else(|| Error::NotCached(target.clone()))?;

        let state_dir = self
            .config
            .state_dir
            .as_deref()
            .filter(|_| self.backend.durable_staging());
        let mut state = state_dir.map(|dir| {
            UploadState::load(dir, &target, self.config.chunk_size)
                .unwrap_or_else(|| UploadState::new(&target, self.config.chunk_size))
        });

        let resuming = state.is_some();
        let staged = async {
            let mut in_flight: FuturesOrdered<BoxFuture<'_, StagedBlock>> =
                FuturesOrdered::new();
            let mut block_ids: Vec<String> = Vec::new();
            let mut bytes = 0u64;
            let mut resumed_blocks = 0usize;
            let mut index = 0usize;

            loop {
                self.check_cancelled()?;
                let Some(chunk) = source.next_chunk(self.config.chunk_size).await? else {
                    break;
                };
                let id = block_id(&chunk);
                let len = chunk.len();

                if state.as_ref().is_some_and(|s| s.is_staged(index, &id)) {
                    tracing::debug!(%target, index, block_id = %id, "block already staged");
                    resumed_blocks += 1;
                    in_flight.push_back(future::ready(Ok((id, len))).boxed());
                } else {
                    in_flight.push_back(self.stage(container, key, index, id, chunk));
                }
                index += 1;

                while in_flight.len() >= self.config.concurrency {
                    let staged = self.next_staged(&mut in_flight).await?;
                    self.record(&mut state, state_dir, &mut block_ids, &mut bytes, staged)?;
                }
            }

            while !in_flight.is_empty() {
                let staged = self.next_staged(&mut in_flight).await?;
                self.record(&mut state, state_dir, &mut block_ids, &mut bytes, staged)?;
            }
            self.check_cancelled()?;

            self.backend
                .commit_block_list(container, key, block_ids.clone())
                .await?;
            Ok::<_, Error>((block_ids, bytes, resumed_blocks))
        }
        .await;

        let (block_ids, bytes, resumed_blocks) = match staged {
            Ok(done) => done,
            Err(e) => {
                // Without resume state nothing can pick these blocks up again
                if !resuming {
                    self.discard_staged(container, key).await;
                }
                return Err(e);
            }
        };
        if let Some(dir) = state_dir {
            UploadState::delete(dir, &target)?;
        }

        tracing::info!(%target, bytes, blocks = block_ids.len(), "committed blob");
        Ok(UploadSummary {
            container: container.to_string(),
            key: key.to_string(),
            bytes,
            block_ids,
            resumed_blocks,
        })
    }

    async fn discard_staged(&self, container: &str, key: &str) {
        match self.backend.discard_staged(container, key).await {
            Ok(()) => tracing::debug!(container, key, "discarded staged blocks"),
            Err(e) => {
                tracing::warn!(container, key, error = %e, "failed to discard staged blocks")
            }
        }
    }

    fn stage<'a>(
        &'a self,
        container: &'a str,
        key: &'a str,
        index: usize,
        id: String,
        chunk: Vec<u8>,
    ) -> BoxFuture<'a, StagedBlock> {
        async move {
            let len = chunk.len();
            tracing::debug!(container, key, index, block_id = %id, len, "staging block");
            self.backend
                .stage_block(container, key, &id, chunk)
                .await
                .map_err(|e| match e {
                    Error::Cancelled => Error::Cancelled,
                    other => Error::PartialTransfer(format!(
                        "staging block {index} of {container}/{key} failed: {other}"
                    )),
                })?;
            Ok((id, len))
        }
        .boxed()
    }

    async fn next_staged(
        &self,
        in_flight: &mut FuturesOrdered<BoxFuture<'_, StagedBlock>>,
    ) -> Result<(String, usize)> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            next = in_flight.next() => next.unwrap_or_else(|| {
                Err(Error::General("staging pipeline is empty".into()))
            }),
        }
    }

    fn record(
        &self,
        state: &mut Option<UploadState>,
        state_dir: Option<&std::path::Path>,
        block_ids: &mut Vec<String>,
        bytes: &mut u64,
        (id, len): (String, usize),
    ) -> Result<()> {
        if let (Some(state), Some(dir)) = (state.as_mut(), state_dir) {
            state.record(block_ids.len(), &id);
            state.save(dir)?;
        }
        block_ids.push(id);
        *bytes += len as u64;
        Ok(())
    }

    /// Drop a blob's cached content, deleting its spill file if any
    pub async fn release(&self, tree: &mut VirtualTree, blob: BlobId) -> Result<()> {
        let content = std::mem::take(&mut tree.blob_mut(blob).content);
        cache::discard(content).await
    }
}

/// Download a blob with `source`, upload it with `dest`, then release the
/// cached copy whether or not the upload succeeded
pub async fn copy_blob(
    source: &TransferEngine,
    src_tree: &mut VirtualTree,
    blob: BlobId,
    dest: &TransferEngine,
    dest_tree: &VirtualTree,
    dest_container: ContainerId,
    cache: &CacheStrategy,
) -> Result<UploadSummary> {
    source.download(src_tree, blob, cache).await?;
    let uploaded = dest.upload(dest_tree, dest_container, src_tree, blob).await;
    let released = source.release(src_tree, blob).await;
    let summary = uploaded?;
    released?;
    Ok(summary)
}
