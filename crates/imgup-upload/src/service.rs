//! Image Service
//!
//! Orchestrates validated uploads and scoped deletes against the object
//! store.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{info, instrument, warn};

use crate::key::{DeleteTarget, KeyCodec};
use crate::name::generate_name;
use crate::policy::TypePolicy;
use crate::sniff::{sniff, SniffedStream};
use crate::storage::{ObjectStore, StorageError};

/// Service errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Secure random source unavailable: {0}")]
    RandomSource(String),
    #[error("Failed to read upload: {0}")]
    Read(#[from] std::io::Error),
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("File too large (max: {max} bytes)")]
    TooLarge { max: usize },
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Storage error: {0}")]
    Backend(#[from] StorageError),
}

impl UploadError {
    /// Whether the error was caused by the request rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            UploadError::Read(_)
                | UploadError::UnsupportedType(_)
                | UploadError::TooLarge { .. }
                | UploadError::InvalidUrl(_)
                | UploadError::InvalidKey(_)
        )
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

/// An image accepted and written to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub size: usize,
}

/// Image service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Largest accepted body in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: imgup_core::UploadConfig::default().max_upload_bytes,
        }
    }
}

impl From<&imgup_core::UploadConfig> for ServiceConfig {
    fn from(config: &imgup_core::UploadConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Image service.
///
/// Holds only read-only state, so one instance is shared by every request.
pub struct ImageService {
    storage: Arc<dyn ObjectStore>,
    codec: KeyCodec,
    policy: TypePolicy,
    config: ServiceConfig,
}

impl ImageService {
    pub fn new(storage: Arc<dyn ObjectStore>, codec: KeyCodec, config: ServiceConfig) -> Self {
        Self {
            storage,
            codec,
            policy: TypePolicy,
            config,
        }
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn storage_name(&self) -> &str {
        self.storage.name()
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.config.max_upload_bytes
    }

    /// Validate and store an uploaded image.
    ///
    /// The type is decided from the content alone; `filename_hint` is only
    /// logged. Nothing reaches the store unless the content is an accepted
    /// image type.
    #[instrument(skip(self, body), fields(storage = %self.storage.name()))]
    pub async fn upload<R>(&self, body: R, filename_hint: Option<&str>) -> UploadResult<StoredImage>
    where
        R: AsyncRead + Unpin + Send,
    {
        let name = generate_name()?;

        let mut stream = SniffedStream::new(body, self.config.max_upload_bytes);
        let content_type = sniff(stream.sniff_head().await?);

        let ext = match self.policy.resolve(&content_type) {
            Some(ext) => ext,
            None => {
                warn!(content_type = %content_type, "Rejected upload");
                return Err(UploadError::UnsupportedType(content_type));
            }
        };

        stream.drain().await?;
        let data = stream.into_bytes();
        let size = data.len();

        let key = self.codec.build_key(&name, ext);
        let url = self.storage.put(&key, data, &content_type).await?;

        if self.codec.parse_url(&url).ok().as_deref() != Some(key.as_str()) {
            warn!(
                url = %url,
                key = %key,
                prefix = %self.codec.prefix(),
                "Store reported a URL outside the configured prefix"
            );
        }

        info!(key = %key, size = size, content_type = %content_type, "Image uploaded");

        Ok(StoredImage {
            key,
            url,
            content_type,
            size,
        })
    }

    /// Delete an image by key or by its public URL.
    ///
    /// The target is resolved and validated before the store is contacted;
    /// returns the key that was deleted.
    #[instrument(skip(self), fields(storage = %self.storage.name()))]
    pub async fn delete(&self, target: DeleteTarget) -> UploadResult<String> {
        let key = match self.codec.resolve(&target) {
            Ok(key) => key,
            Err(e) => {
                warn!(target = %target, error = %e, "Rejected delete");
                return Err(e);
            }
        };

        self.storage.delete(&key).await?;

        info!(key = %key, bucket = %self.storage.bucket(), "Image deleted");
        Ok(key)
    }
}
