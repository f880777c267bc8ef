//! # imgup-core
//!
//! Configuration shared by the imgup crates.
//!
//! The configuration is built once at startup and handed to the upload
//! service and the HTTP layer by reference; nothing in here is mutated while
//! requests are being served.

pub mod config;

pub use config::{
    AppConfig, ConfigError, S3Settings, ServerConfig, StorageBackend, StorageConfig, UploadConfig,
};
