//! Storage keys and public URLs
//!
//! A stored image has a key `images/<name><ext>` and a public URL which is the
//! bucket prefix followed by the key. [`KeyCodec`] converts between the two
//! and refuses URLs that are not rooted at the configured prefix.

use crate::name::NAME_LEN;
use crate::policy::TypePolicy;
use crate::service::{UploadError, UploadResult};

/// Folder every uploaded object is stored under
pub const KEY_FOLDER: &str = "images/";

/// What a delete request names: a key, or a public URL issued earlier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    ByKey(String),
    ByUrl(String),
}

impl DeleteTarget {
    /// The raw identifier as the client supplied it
    pub fn as_str(&self) -> &str {
        match self {
            DeleteTarget::ByKey(key) => key,
            DeleteTarget::ByUrl(url) => url,
        }
    }
}

impl std::fmt::Display for DeleteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts between storage keys and public URLs for one bucket
#[derive(Debug, Clone)]
pub struct KeyCodec {
    prefix: String,
    policy: TypePolicy,
}

impl KeyCodec {
    /// `prefix` must be the exact URL prefix the object store reports
    /// locations under, e.g. `https://bucket.s3.us-east-1.amazonaws.com/`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            policy: TypePolicy,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the key for a freshly generated name
    pub fn build_key(&self, name: &str, ext: &str) -> String {
        format!("{}{}{}", KEY_FOLDER, name, ext)
    }

    /// Public URL for `key`
    pub fn public_url(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Recover the key from a public URL.
    ///
    /// The prefix comparison is literal and case-sensitive, so a URL naming
    /// another bucket, host or scheme is rejected.
    pub fn parse_url(&self, url: &str) -> UploadResult<String> {
        match url.strip_prefix(self.prefix.as_str()) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(UploadError::InvalidUrl(url.to_string())),
        }
    }

    /// Check that `key` has the shape of a key issued by this service:
    /// `images/` + 64 lowercase hex characters + an accepted extension.
    pub fn validate_key(&self, key: &str) -> UploadResult<()> {
        let invalid = || UploadError::InvalidKey(key.to_string());

        let rest = key.strip_prefix(KEY_FOLDER).ok_or_else(invalid)?;
        if rest.len() <= NAME_LEN || !rest.is_char_boundary(NAME_LEN) {
            return Err(invalid());
        }
        let (name, ext) = rest.split_at(NAME_LEN);

        let name_ok = name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !name_ok || !self.policy.is_known_extension(ext) {
            return Err(invalid());
        }
        Ok(())
    }

    /// Resolve a delete target to a canonical, validated key
    pub fn resolve(&self, target: &DeleteTarget) -> UploadResult<String> {
        let key = match target {
            DeleteTarget::ByKey(key) => key.clone(),
            DeleteTarget::ByUrl(url) => self.parse_url(url)?,
        };
        self.validate_key(&key)?;
        Ok(key)
    }
}
