//! In-process backend
//!
//! Keeps containers, committed objects and staged blocks in memory. Staged
//! blocks outlive individual uploads, so it reports durable staging. Every
//! stage and commit call is recorded for inspection.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::traits::{BoxedReader, CloudBackend, ObjectEntry};
use crate::tree::Origin;

/// A recorded `stage_block` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCall {
    pub container: String,
    pub key: String,
    pub block_id: String,
    pub len: usize,
}

/// A recorded `commit_block_list` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCall {
    pub container: String,
    pub key: String,
    pub block_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    staged: HashMap<(String, String), HashMap<String, Vec<u8>>>,
    stage_log: Vec<StagedCall>,
    commit_log: Vec<CommitCall>,
}

/// Thread-safe in-memory object store
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
    base_url: String,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            base_url: "memory://local".to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an object directly, creating its container if needed
    pub fn insert(&self, container: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.lock()
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    /// Committed content of an object
    pub fn object(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .containers
            .get(container)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    /// Every `stage_block` call so far, in call order
    pub fn stage_log(&self) -> Vec<StagedCall> {
        self.lock().stage_log.clone()
    }

    /// Every `commit_block_list` call so far, in call order
    pub fn commit_log(&self) -> Vec<CommitCall> {
        self.lock().commit_log.clone()
    }

    /// Number of uncommitted blocks staged for an object
    pub fn staged_count(&self, container: &str, key: &str) -> usize {
        self.lock()
            .staged
            .get(&(container.to_string(), key.to_string()))
            .map_or(0, HashMap::len)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudBackend for MemoryBackend {
    fn origin(&self) -> Origin {
        Origin::Memory
    }

    fn durable_staging(&self) -> bool {
        true
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        Ok(self.lock().containers.keys().cloned().collect())
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        self.lock()
            .containers
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    async fn list_objects_with_prefix(
        &self,
        container: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectEntry>> {
        let state = self.lock();
        let objects = state
            .containers
            .get(container)
            .ok_or_else(|| Error::NotFound(format!("container {container}")))?;
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, data)| ObjectEntry::new(key.clone(), data.len() as u64))
            .collect())
    }

    async fn get_object_url(&self, container: &str, key: &str) -> Result<String> {
        Ok(format!("{}/{container}/{key}", self.base_url))
    }

    async fn open_read_stream(&self, container: &str, key: &str) -> Result<BoxedReader> {
        let data = self
            .object(container, key)
            .ok_or_else(|| Error::NotFound(format!("{container}/{key}")))?;
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn stage_block(
        &self,
        container: &str,
        key: &str,
        block_id: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let mut state = self.lock();
        if !state.containers.contains_key(container) {
            return Err(Error::NotFound(format!("container {container}")));
        }
        state.stage_log.push(StagedCall {
            container: container.to_string(),
            key: key.to_string(),
            block_id: block_id.to_string(),
            len: data.len(),
        });
        state
            .staged
            .entry((container.to_string(), key.to_string()))
            .or_default()
            .insert(block_id.to_string(), data);
        Ok(())
    }

    async fn commit_block_list(
        &self,
        container: &str,
        key: &str,
        block_ids: Vec<String>,
    ) -> Result<()> {
        let mut state = self.lock();
        let staged_key = (container.to_string(), key.to_string());

        let mut content = Vec::new();
        {
            let empty = HashMap::new();
            let staged = state.staged.get(&staged_key).unwrap_or(&empty);
            for id in &block_ids {
                let block = staged
                    .get(id)
                    .ok_or_else(|| Error::NotFound(format!("block {id} of {container}/{key}")))?;
                content.extend_from_slice(block);
            }
        }

        state.commit_log.push(CommitCall {
            container: container.to_string(),
            key: key.to_string(),
            block_ids,
        });
        state.staged.remove(&staged_key);
        state
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), content);
        Ok(())
    }

    async fn discard_staged(&self, container: &str, key: &str) -> Result<()> {
        self.lock()
            .staged
            .remove(&(container.to_string(), key.to_string()));
        Ok(())
    }
}
