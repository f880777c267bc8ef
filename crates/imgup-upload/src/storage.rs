//! Object Storage Gateway
//!
//! The only boundary between the upload pipeline and the durable store. The
//! store itself is the source of truth for which images exist; nothing in
//! this crate keeps an index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use imgup_core::S3Settings;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Object store gateway
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, returning the object's public URL
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String>;

    /// Remove `key`. Removing a key that does not exist is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Bucket the store writes to
    fn bucket(&self) -> &str;

    /// Get storage name for logging
    fn name(&self) -> &str;
}

/// In-memory object store.
///
/// Used by tests as a counting stub and by local runs without a bucket.
pub struct MemoryStorage {
    prefix: String,
    objects: RwLock<HashMap<String, (Bytes, String)>>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStorage {
    /// `prefix` is prepended to keys to form the reported URL
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            objects: RwLock::new(HashMap::new()),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Number of `put` calls received
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls received
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Stored body and content type for `key`
    pub async fn get(&self, key: &str) -> StorageResult<(Bytes, String)> {
        let objects = self.objects.read().await;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        self.puts.fetch_add(1, Ordering::SeqCst);

        let mut objects = self.objects.write().await;
        objects.insert(key.to_string(), (data, content_type.to_string()));

        Ok(format!("{}{}", self.prefix, key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);

        let mut objects = self.objects.write().await;
        objects.remove(key);
        Ok(())
    }

    fn bucket(&self) -> &str {
        "memory"
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// S3 (or S3-compatible) object store
pub struct S3Storage {
    client: Client,
    bucket: String,
    url_prefix: String,
}

impl S3Storage {
    pub fn new(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "imgup",
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(settings.path_style);

        if let Some(ref endpoint) = settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            bucket = %settings.bucket,
            region = %settings.region,
            endpoint = ?settings.endpoint,
            "S3 storage initialized"
        );

        Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            url_prefix: settings.public_url_prefix(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self, data), fields(storage = "s3", bucket = %self.bucket, size = data.len()))]
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                let msg = DisplayErrorContext(&e).to_string();
                error!(key = %key, error = %msg, "S3 upload failed");
                StorageError::BackendError(msg)
            })?;

        debug!(key = %key, "Object stored");
        Ok(format!("{}{}", self.url_prefix, key))
    }

    /// Deletes through the batch `DeleteObjects` call with a single entry.
    /// Per-object failures come back inside a successful response and are
    /// surfaced as errors here.
    #[instrument(skip(self), fields(storage = "s3", bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let object = ObjectIdentifier::builder()
            .key(key)
            .build()
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        let batch = Delete::builder()
            .objects(object)
            .quiet(true)
            .build()
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(batch)
            .send()
            .await
            .map_err(|e| {
                let msg = DisplayErrorContext(&e).to_string();
                error!(key = %key, error = %msg, "S3 delete failed");
                StorageError::BackendError(msg)
            })?;

        if let Some(failed) = output.errors().first() {
            let msg = format!(
                "{}: {}",
                failed.code().unwrap_or("Unknown"),
                failed.message().unwrap_or("delete rejected")
            );
            error!(key = %key, error = %msg, "S3 rejected object delete");
            return Err(StorageError::BackendError(msg));
        }

        debug!(key = %key, "Object deleted");
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn name(&self) -> &str {
        "s3"
    }
}
