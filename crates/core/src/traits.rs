//! CloudBackend trait definition
//!
//! This trait defines the vendor-specific operations the mapper and the
//! transfer engine consume. Clients are constructed by the caller and passed
//! in, so the core never knows how credentials or connections are set up.

use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::tree::Origin;

/// Sequential reader over a blob's content
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// One entry of a flat object listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Full key as stored in the backend
    pub key: String,

    /// Size in bytes
    pub size: u64,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// Operations a cloud object store exposes to the core
///
/// Implementations must tolerate concurrent calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudBackend: Send + Sync {
    /// Which vendor this backend talks to
    fn origin(&self) -> Origin;

    /// Whether staged blocks survive this process, so an interrupted upload
    /// can skip re-staging them later
    fn durable_staging(&self) -> bool {
        false
    }

    /// List real containers
    async fn list_containers(&self) -> Result<Vec<String>>;

    /// Create a real container
    async fn create_container(&self, container: &str) -> Result<()>;

    /// List every object in `container` whose key starts with `prefix`
    async fn list_objects_with_prefix(
        &self,
        container: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectEntry>>;

    /// Backend-resolved address of an object
    async fn get_object_url(&self, container: &str, key: &str) -> Result<String>;

    /// Open a sequential reader; fails with `NotFound` if absent
    async fn open_read_stream(&self, container: &str, key: &str) -> Result<BoxedReader>;

    /// Stage one uncommitted block of an object
    async fn stage_block(
        &self,
        container: &str,
        key: &str,
        block_id: &str,
        data: Vec<u8>,
    ) -> Result<()>;

    /// Replace the object's content with the given staged blocks, in order
    async fn commit_block_list(
        &self,
        container: &str,
        key: &str,
        block_ids: Vec<String>,
    ) -> Result<()>;

    /// Drop blocks staged for an object that will not be committed
    async fn discard_staged(&self, _container: &str, _key: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_entry_new() {
        let entry = ObjectEntry::new("vdir1/blob2", 1024);
        assert_eq!(entry.key, "vdir1/blob2");
        assert_eq!(entry.size, 1024);
    }

    #[tokio::test]
    async fn test_mock_backend_defaults() {
        let mut mock = MockCloudBackend::new();
        mock.expect_origin().return_const(Origin::Memory);
        mock.expect_durable_staging().return_const(false);
        mock.expect_list_containers()
            .returning(|| Ok(vec!["c".to_string()]));

        assert_eq!(mock.origin(), Origin::Memory);
        assert!(!mock.durable_staging());
        assert_eq!(mock.list_containers().await.unwrap(), vec!["c"]);
    }
}
