//! Retrying backend decorator
//!
//! Wraps a [`CloudBackend`] and re-issues calls that failed with a transient
//! error, backing off exponentially between attempts. Other errors are
//! returned on the first failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::{BoxedReader, CloudBackend, ObjectEntry};
use crate::tree::Origin;

/// How often and how patiently to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// A backend whose calls are retried according to a [`RetryPolicy`]
pub struct Retrying {
    inner: Arc<dyn CloudBackend>,
    policy: RetryPolicy,
}

impl Retrying {
    pub fn new(inner: Arc<dyn CloudBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn run<T, F, Fut>(&self, operation_name: &'static str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying backend call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl CloudBackend for Retrying {
    fn origin(&self) -> Origin {
        self.inner.origin()
    }

    fn durable_staging(&self) -> bool {
        self.inner.durable_staging()
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        self.run("list_containers", || self.inner.list_containers())
            .await
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        self.run("create_container", || self.inner.create_container(container))
            .await
    }

    async fn list_objects_with_prefix(
        &self,
        container: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectEntry>> {
        self.run("list_objects", || {
            self.inner.list_objects_with_prefix(container, prefix)
        })
        .await
    }

    async fn get_object_url(&self, container: &str, key: &str) -> Result<String> {
        self.run("get_object_url", || self.inner.get_object_url(container, key))
            .await
    }

    async fn open_read_stream(&self, container: &str, key: &str) -> Result<BoxedReader> {
        self.run("open_read_stream", || {
            self.inner.open_read_stream(container, key)
        })
        .await
    }

    async fn stage_block(
        &self,
        container: &str,
        key: &str,
        block_id: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        self.run("stage_block", || {
            self.inner.stage_block(container, key, block_id, data.clone())
        })
        .await
    }

    async fn commit_block_list(
        &self,
        container: &str,
        key: &str,
        block_ids: Vec<String>,
    ) -> Result<()> {
        self.run("commit_block_list", || {
            self.inner.commit_block_list(container, key, block_ids.clone())
        })
        .await
    }

    async fn discard_staged(&self, container: &str, key: &str) -> Result<()> {
        self.run("discard_staged", || self.inner.discard_staged(container, key))
            .await
    }
}
