//! S3 backend implementation
//!
//! Wraps aws-sdk-s3 and implements the CloudBackend trait from vcp-core.
//! S3 has no block staging of its own, so staged blocks are held in process
//! memory and written out on commit, either with a single PUT or as a
//! multipart upload for larger objects.

use std::collections::HashMap;
use std::fmt::Display;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_smithy_types::timeout::TimeoutConfig;
use futures::stream::{self, StreamExt, TryStreamExt};

use vcp_core::{BoxedReader, CloudBackend, Error, ObjectEntry, Origin, Result};

use crate::multipart::{calculate_part_size, plan_parts};

/// Connection settings for one S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Endpoint URL, e.g. `http://localhost:9000`
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,

    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    pub path_style: bool,

    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,

    /// Parts uploaded concurrently during a multipart commit
    pub part_concurrency: usize,
}

impl S3Settings {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: "us-east-1".to_string(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            path_style: true,
            connect_timeout: None,
            read_timeout: None,
            part_concurrency: 4,
        }
    }
}

/// Blocks staged for objects that have not been committed yet
#[derive(Debug, Default)]
pub struct BlockStaging {
    blocks: Mutex<HashMap<(String, String), HashMap<String, Vec<u8>>>>,
}

impl BlockStaging {
    fn lock(&self) -> MutexGuard<'_, HashMap<(String, String), HashMap<String, Vec<u8>>>> {
        self.blocks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stage(&self, bucket: &str, key: &str, block_id: &str, data: Vec<u8>) {
        self.lock()
            .entry((bucket.to_string(), key.to_string()))
            .or_default()
            .insert(block_id.to_string(), data);
    }

    /// Length of each block in `ids`, failing on an id that was never staged
    pub fn lens(&self, bucket: &str, key: &str, ids: &[String]) -> Result<Vec<usize>> {
        let staging = self.lock();
        let staged = staging.get(&(bucket.to_string(), key.to_string()));
        ids.iter()
            .map(|id| {
                staged
                    .and_then(|blocks| blocks.get(id))
                    .map(Vec::len)
                    .ok_or_else(|| missing_block(bucket, key, id))
            })
            .collect()
    }

    /// Concatenate the blocks of `ids` in order; staged data stays in place
    ///
    /// The same id may appear more than once.
    pub fn assemble(&self, bucket: &str, key: &str, ids: &[String]) -> Result<Vec<u8>> {
        let staging = self.lock();
        let staged = staging.get(&(bucket.to_string(), key.to_string()));
        let mut data = Vec::new();
        for id in ids {
            let block = staged
                .and_then(|blocks| blocks.get(id))
                .ok_or_else(|| missing_block(bucket, key, id))?;
            data.extend_from_slice(block);
        }
        Ok(data)
    }

    /// Drop every block staged for an object
    pub fn clear(&self, bucket: &str, key: &str) {
        self.lock().remove(&(bucket.to_string(), key.to_string()));
    }

    pub fn staged_count(&self, bucket: &str, key: &str) -> usize {
        self.lock()
            .get(&(bucket.to_string(), key.to_string()))
            .map_or(0, HashMap::len)
    }
}

fn missing_block(bucket: &str, key: &str, id: &str) -> Error {
    Error::NotFound(format!("block {id} of {bucket}/{key}"))
}

/// Map an SDK error onto the core error kinds
fn classify<E, R>(err: SdkError<E, R>, what: impl Display) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    match err.code() {
        Some("NoSuchKey" | "NoSuchBucket" | "NotFound" | "NoSuchUpload") => {
            Error::NotFound(what.to_string())
        }
        Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch") => {
            Error::General(format!("{what}: {}", DisplayErrorContext(&err)))
        }
        _ => Error::BackendUnavailable(format!("{what}: {}", DisplayErrorContext(&err))),
    }
}

/// Path-style URL of an object
pub fn object_url(endpoint: &str, bucket: &str, key: &str) -> Result<String> {
    let mut url = url::Url::parse(endpoint)
        .map_err(|e| Error::Config(format!("invalid endpoint {endpoint}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("endpoint cannot be a base: {endpoint}")))?
        .pop_if_empty()
        .push(bucket)
        .extend(key.split('/'));
    Ok(url.to_string())
}

/// S3 backend
pub struct S3Backend {
    inner: aws_sdk_s3::Client,
    settings: S3Settings,
    staging: BlockStaging,
}

impl S3Backend {
    /// Create a client for the given endpoint
    pub async fn new(settings: S3Settings) -> Result<Self> {
        let credentials = aws_credential_types::Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "vcp-static-credentials",
        );

        let mut timeouts = TimeoutConfig::builder();
        if let Some(connect) = settings.connect_timeout {
            timeouts = timeouts.connect_timeout(connect);
        }
        if let Some(read) = settings.read_timeout {
            timeouts = timeouts.read_timeout(read);
        }

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(settings.region.clone()))
            .endpoint_url(&settings.endpoint)
            .timeout_config(timeouts.build())
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(settings.path_style)
            .build();

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            settings,
            staging: BlockStaging::default(),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    async fn put_whole(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify(e, format!("{bucket}/{key}")))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        block_ids: &[String],
        parts: Vec<Range<usize>>,
    ) -> Result<()> {
        let created = self
            .inner
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, format!("{bucket}/{key}")))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::General("multipart upload returned no upload id".into()))?
            .to_string();

        let result = self
            .upload_parts(bucket, key, &upload_id, block_ids, parts)
            .await;
        let completed = match result {
            Ok(completed) => completed,
            Err(e) => {
                if let Err(abort) = self
                    .inner
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        bucket,
                        key,
                        error = %DisplayErrorContext(&abort),
                        "failed to abort multipart upload"
                    );
                }
                return Err(e);
            }
        };

        self.inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify(e, format!("{bucket}/{key}")))?;
        Ok(())
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        block_ids: &[String],
        parts: Vec<Range<usize>>,
    ) -> Result<Vec<CompletedPart>> {
        // Parts are copied out of staging only while in flight
        stream::iter(parts.into_iter().enumerate())
            .map(|(i, range)| async move {
                let part_number = i as i32 + 1;
                let data = self.staging.assemble(bucket, key, &block_ids[range])?;
                tracing::debug!(bucket, key, part_number, len = data.len(), "uploading part");
                let response = self
                    .inner
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(data))
                    .send()
                    .await
                    .map_err(|e| classify(e, format!("{bucket}/{key} part {part_number}")))?;
                Ok::<_, Error>(
                    CompletedPart::builder()
                        .part_number(part_number)
                        .set_e_tag(response.e_tag().map(str::to_string))
                        .build(),
                )
            })
            .buffered(self.settings.part_concurrency.max(1))
            .try_collect()
            .await
    }
}

#[async_trait]
impl CloudBackend for S3Backend {
    fn origin(&self) -> Origin {
        Origin::S3
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        let response = self
            .inner
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify(e, "list buckets"))?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        match self.inner.create_bucket().bucket(container).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BucketAlreadyOwnedByYou") => Ok(()),
            Err(e) => Err(classify(e, format!("bucket {container}"))),
        }
    }

    async fn list_objects_with_prefix(
        &self,
        container: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.inner.list_objects_v2().bucket(container);
            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| classify(e, format!("bucket {container}")))?;

            for object in response.contents() {
                let key = object.key().unwrap_or_default();
                let size = object.size().unwrap_or(0).max(0) as u64;
                entries.push(ObjectEntry::new(key, size));
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        tracing::debug!(bucket = container, prefix, count = entries.len(), "listed objects");
        Ok(entries)
    }

    async fn get_object_url(&self, container: &str, key: &str) -> Result<String> {
        object_url(&self.settings.endpoint, container, key)
    }

    async fn open_read_stream(&self, container: &str, key: &str) -> Result<BoxedReader> {
        let response = self
            .inner
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, format!("{container}/{key}")))?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    async fn stage_block(
        &self,
        container: &str,
        key: &str,
        block_id: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        self.staging.stage(container, key, block_id, data);
        Ok(())
    }

    async fn commit_block_list(
        &self,
        container: &str,
        key: &str,
        block_ids: Vec<String>,
    ) -> Result<()> {
        let lens = self.staging.lens(container, key, &block_ids)?;
        let total: u64 = lens.iter().map(|l| *l as u64).sum();
        let ranges = plan_parts(&lens, calculate_part_size(total));

        if ranges.len() <= 1 {
            let data = self.staging.assemble(container, key, &block_ids)?;
            self.put_whole(container, key, data).await?;
        } else {
            self.put_multipart(container, key, &block_ids, ranges).await?;
        }

        self.staging.clear(container, key);
        tracing::debug!(bucket = container, key, bytes = total, "committed object");
        Ok(())
    }

    async fn discard_staged(&self, container: &str, key: &str) -> Result<()> {
        self.staging.clear(container, key);
        Ok(())
    }
}
