//! Cache strategies for content in flight
//!
//! A blob is downloaded into a [`CacheSink`] and read back for upload from a
//! [`CacheSource`]. Both work one chunk at a time; the in-memory variant
//! keeps the whole content in a `Vec<u8>`, the spill variant writes it to a
//! file named after the blob's full virtual path.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

use crate::error::{Error, Result};
use crate::tree::CachedContent;

/// Where downloaded content is held until it is uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStrategy {
    InMemory,
    SpillToDisk { dir: PathBuf },
}

impl CacheStrategy {
    /// Spill to `dir`
    pub fn spill_to(dir: impl Into<PathBuf>) -> Self {
        CacheStrategy::SpillToDisk { dir: dir.into() }
    }

    /// Open a sink for a blob identified by `virtual_path`
    pub async fn open_sink(&self, virtual_path: &str) -> Result<CacheSink> {
        match self {
            CacheStrategy::InMemory => Ok(CacheSink::Memory(Vec::new())),
            CacheStrategy::SpillToDisk { dir } => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::cache_io(dir.display(), e))?;
                let path = spill_path(dir, virtual_path);
                let file = File::create(&path)
                    .await
                    .map_err(|e| Error::cache_io(path.display(), e))?;
                Ok(CacheSink::Disk {
                    writer: BufWriter::new(file),
                    path,
                    len: 0,
                })
            }
        }
    }
}

/// Cache file for a virtual path
///
/// The name is a digest of the whole path, so blobs sharing a leaf name in
/// different directories never collide.
pub fn spill_path(dir: &Path, virtual_path: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(virtual_path.as_bytes());
    dir.join(format!("{}.blob", hex::encode(hasher.finalize())))
}

/// Destination of a download
#[derive(Debug)]
pub enum CacheSink {
    Memory(Vec<u8>),
    Disk {
        writer: BufWriter<File>,
        path: PathBuf,
        len: u64,
    },
}

impl CacheSink {
    /// Append one chunk
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        match self {
            CacheSink::Memory(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            CacheSink::Disk { writer, path, len } => {
                writer
                    .write_all(chunk)
                    .await
                    .map_err(|e| Error::cache_io(path.display(), e))?;
                *len += chunk.len() as u64;
                Ok(())
            }
        }
    }

    /// Flush and hand back the content for the blob node
    pub async fn finish(self) -> Result<CachedContent> {
        match self {
            CacheSink::Memory(buf) => Ok(CachedContent::InMemory(buf)),
            CacheSink::Disk {
                mut writer,
                path,
                len,
            } => {
                if let Err(e) = writer.flush().await {
                    drop(writer);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(Error::cache_io(path.display(), e));
                }
                Ok(CachedContent::Spilled { path, len })
            }
        }
    }

    /// Drop whatever was written so far
    pub async fn abort(self) {
        if let CacheSink::Disk { writer, path, .. } = self {
            drop(writer);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove partial cache file");
            }
        }
    }
}

/// Sequential chunk reader over cached content
#[derive(Debug)]
pub enum CacheSource<'a> {
    Memory { data: &'a [u8], offset: usize },
    Disk { file: File, path: PathBuf },
}

impl<'a> CacheSource<'a> {
    /// Open cached content for reading
    pub async fn open(content: &'a CachedContent) -> Result<Option<CacheSource<'a>>> {
        match content {
            CachedContent::Empty => Ok(None),
            CachedContent::InMemory(data) => Ok(Some(CacheSource::Memory { data, offset: 0 })),
            CachedContent::Spilled { path, .. } => {
                let file = File::open(path)
                    .await
                    .map_err(|e| Error::cache_io(path.display(), e))?;
                Ok(Some(CacheSource::Disk {
                    file,
                    path: path.clone(),
                }))
            }
        }
    }

    /// Next chunk of at most `chunk_size` bytes; `None` once exhausted
    ///
    /// Every chunk but the last is exactly `chunk_size` long.
    pub async fn next_chunk(&mut self, chunk_size: usize) -> Result<Option<Vec<u8>>> {
        match self {
            CacheSource::Memory { data, offset } => {
                if *offset >= data.len() {
                    return Ok(None);
                }
                let end = (*offset + chunk_size).min(data.len());
                let chunk = data[*offset..end].to_vec();
                *offset = end;
                Ok(Some(chunk))
            }
            CacheSource::Disk { file, path } => {
                let mut chunk = Vec::with_capacity(chunk_size);
                (&mut *file)
                    .take(chunk_size as u64)
                    .read_to_end(&mut chunk)
                    .await
                    .map_err(|e| Error::cache_io(path.display(), e))?;
                if chunk.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(chunk))
                }
            }
        }
    }
}

/// Release cached content, deleting a spill file if there is one
pub async fn discard(content: CachedContent) -> Result<()> {
    if let CachedContent::Spilled { path, .. } = content {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::cache_io(path.display(), e)),
        }
    }
    Ok(())
}
