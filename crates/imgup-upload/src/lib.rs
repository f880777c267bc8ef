//! # imgup-upload
//!
//! Validated image uploads to an object store.
//!
//! ## Pipeline
//!
//! - Names come from the OS CSPRNG (32 bytes, hex-encoded)
//! - Content type is sniffed from the first 512 bytes of the body, never
//!   taken from the client
//! - Only GIF, WebP, PNG and JPEG are accepted
//! - Keys are `images/<name><ext>`; public URLs are the bucket prefix plus
//!   the key, and delete requests are mapped back through the same prefix
//!
//! ## Example
//!
//! ```rust,ignore
//! use imgup_upload::{DeleteTarget, ImageService, KeyCodec, MemoryStorage, ServiceConfig};
//! use std::sync::Arc;
//!
//! let prefix = "https://pics.s3.us-east-1.amazonaws.com/";
//! let storage = Arc::new(MemoryStorage::new(prefix));
//! let service = ImageService::new(storage, KeyCodec::new(prefix), ServiceConfig::default());
//!
//! let stored = service.upload(&png_bytes[..], Some("cat.png")).await?;
//! service.delete(DeleteTarget::ByUrl(stored.url)).await?;
//! ```

pub mod key;
pub mod name;
pub mod policy;
pub mod service;
pub mod sniff;
pub mod storage;

pub use key::{DeleteTarget, KeyCodec, KEY_FOLDER};
pub use name::generate_name;
pub use policy::TypePolicy;
pub use service::{ImageService, ServiceConfig, StoredImage, UploadError, UploadResult};
pub use sniff::{sniff, SniffedStream, SNIFF_LEN};
pub use storage::{MemoryStorage, ObjectStore, S3Storage, StorageError, StorageResult};
