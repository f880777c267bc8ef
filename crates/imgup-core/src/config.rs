//! Configuration types and loading
//!
//! Values come from an optional TOML file layered under environment
//! variables. The environment variable names follow the deployment
//! conventions of the service (`AWS_*` for the bucket, `IMGUP_*` for the
//! service itself).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Object storage configuration
    pub storage: StorageConfig,

    /// Upload limits
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_seconds: 60,
        }
    }
}

/// Which object store the service talks to
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    S3,
    /// In-process store, objects vanish on restart
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue {
                key: "IMGUP_STORAGE_BACKEND".to_string(),
                message: format!("unknown backend `{}` (expected `s3` or `memory`)", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3: S3Settings,
}

/// Bucket coordinates and credentials
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack, ...)
    pub endpoint: Option<String>,
    pub path_style: bool,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            endpoint: None,
            path_style: false,
        }
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl S3Settings {
    /// URL prefix every public object URL in this bucket starts with.
    ///
    /// Both the storage gateway (when reporting an object's location) and the
    /// key codec (when mapping a URL back to its key) derive the prefix from
    /// here, so the two directions always agree.
    pub fn public_url_prefix(&self) -> String {
        match self.endpoint.as_deref() {
            Some(endpoint) => {
                let endpoint = endpoint.trim_end_matches('/');
                if self.path_style {
                    format!("{}/{}/", endpoint, self.bucket)
                } else {
                    let (scheme, host) = endpoint
                        .split_once("://")
                        .unwrap_or(("https", endpoint));
                    format!("{}://{}.{}/", scheme, self.bucket, host)
                }
            }
            None if self.path_style => {
                format!("https://s3.{}.amazonaws.com/{}/", self.region, self.bucket)
            }
            None => format!("https://{}.s3.{}.amazonaws.com/", self.bucket, self.region),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted upload body in bytes
    pub max_upload_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 5 * 1024 * 1024, // 5 MiB
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("Config file error: {0}")]
    FileError(String),
}

impl AppConfig {
    /// Load configuration the way the server does at startup.
    ///
    /// `IMGUP_CONFIG_FILE`, when set, names a TOML file providing the base
    /// values; environment variables override it.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("IMGUP_CONFIG_FILE") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_vars(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading config file");

        ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| ConfigError::FileError(e.to_string()))
    }

    /// Override values from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_vars<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Bucket
        if let Some(bucket) = get("AWS_S3_BUCKET_NAME") {
            self.storage.s3.bucket = bucket;
        }
        if let Some(region) = get("AWS_REGION") {
            self.storage.s3.region = region;
        }
        if let Some(key) = get("AWS_ACCESS_KEY") {
            self.storage.s3.access_key_id = key;
        }
        if let Some(secret) = get("AWS_SECRET_KEY") {
            self.storage.s3.secret_access_key = secret;
        }
        if let Some(endpoint) = get("AWS_S3_ENDPOINT") {
            self.storage.s3.endpoint = Some(endpoint).filter(|e| !e.is_empty());
        }
        if let Some(v) = get("AWS_S3_PATH_STYLE") {
            self.storage.s3.path_style = parse_bool(&v);
        }
        if let Some(v) = get("IMGUP_STORAGE_BACKEND") {
            self.storage.backend = v.parse()?;
        }

        // Server
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_var(&get, "PORT")? {
            self.server.port = port;
        }
        if let Some(secs) = parse_var(&get, "IMGUP_REQUEST_TIMEOUT_SECONDS")? {
            self.server.request_timeout_seconds = secs;
        }

        // Upload
        if let Some(max) = parse_var(&get, "IMGUP_MAX_UPLOAD_BYTES")? {
            self.upload.max_upload_bytes = max;
        }

        Ok(())
    }

    /// Check that the configuration is usable for the selected backend
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StorageBackend::S3 {
            if self.storage.s3.bucket.is_empty() {
                return Err(ConfigError::MissingEnvVar("AWS_S3_BUCKET_NAME".to_string()));
            }
            if self.storage.s3.region.is_empty() {
                return Err(ConfigError::MissingEnvVar("AWS_REGION".to_string()));
            }
        }
        if self.upload.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "IMGUP_MAX_UPLOAD_BYTES".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Get the server address
    pub fn server_addr(&self) -> std::net::SocketAddr {
        use std::net::SocketAddr;
        let ip: std::net::IpAddr = self.server.host.parse().unwrap_or([0, 0, 0, 0].into());
        SocketAddr::new(ip, self.server.port)
    }
}

fn parse_bool(v: &str) -> bool {
    v == "true" || v == "1" || v == "yes"
}

fn parse_var<T, F>(get: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.upload.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.storage.backend, StorageBackend::S3);
    }

    #[test]
    fn test_public_url_prefix() {
        let s3 = S3Settings {
            bucket: "my-images".to_string(),
            region: "eu-west-1".to_string(),
            ..Default::default()
        };
        assert_eq!(
            s3.public_url_prefix(),
            "https://my-images.s3.eu-west-1.amazonaws.com/"
        );
    }

    #[test]
    fn test_public_url_prefix_custom_endpoint() {
        let mut s3 = S3Settings {
            bucket: "pics".to_string(),
            endpoint: Some("http://localhost:9000/".to_string()),
            path_style: true,
            ..Default::default()
        };
        assert_eq!(s3.public_url_prefix(), "http://localhost:9000/pics/");

        s3.path_style = false;
        assert_eq!(s3.public_url_prefix(), "http://pics.localhost:9000/");
    }

    #[test]
    fn test_apply_vars() {
        let mut config = AppConfig::default();
        config
            .apply_vars(vars(&[
                ("AWS_S3_BUCKET_NAME", "uploads"),
                ("AWS_REGION", "us-west-2"),
                ("AWS_ACCESS_KEY", "AKIA"),
                ("AWS_SECRET_KEY", "shh"),
                ("PORT", "9001"),
                ("IMGUP_MAX_UPLOAD_BYTES", "1024"),
                ("IMGUP_STORAGE_BACKEND", "memory"),
            ]))
            .unwrap();

        assert_eq!(config.storage.s3.bucket, "uploads");
        assert_eq!(config.storage.s3.region, "us-west-2");
        assert_eq!(config.storage.s3.access_key_id, "AKIA");
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.upload.max_upload_bytes, 1024);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_invalid_port() {
        let mut config = AppConfig::default();
        let result = config.apply_vars(vars(&[("PORT", "eighty")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { key, .. }) if key == "PORT"));
    }

    #[test]
    fn test_unknown_backend() {
        let mut config = AppConfig::default();
        let result = config.apply_vars(vars(&[("IMGUP_STORAGE_BACKEND", "gcs")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validate_requires_bucket_for_s3() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingEnvVar(var)) if var == "AWS_S3_BUCKET_NAME"
        ));

        let mut memory = AppConfig::default();
        memory.storage.backend = StorageBackend::Memory;
        assert!(memory.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let s3 = S3Settings {
            secret_access_key: "super-secret".to_string(),
            ..Default::default()
        };
        let rendered = format!("{:?}", s3);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("imgup-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
[server]
port = 8081

[storage]
backend = "memory"

[storage.s3]
bucket = "from-file"
"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.s3.bucket, "from-file");
        assert_eq!(config.storage.s3.region, "us-east-1");
    }

    #[test]
    fn test_server_addr() {
        let config = AppConfig::default();
        let addr = config.server_addr();
        assert_eq!(addr.port(), 8000);
    }
}
