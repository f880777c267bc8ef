//! Object name generation

use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::service::{UploadError, UploadResult};

/// Number of random bytes behind every generated name
pub const NAME_BYTES: usize = 32;

/// Length of a generated name once hex-encoded
pub const NAME_LEN: usize = NAME_BYTES * 2;

/// Generate an unpredictable object name.
///
/// Draws straight from the operating system CSPRNG. If the OS source fails
/// the error is surfaced; there is no fallback to a weaker generator.
pub fn generate_name() -> UploadResult<String> {
    let mut buf = [0u8; NAME_BYTES];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| UploadError::RandomSource(e.to_string()))?;
    Ok(hex::encode(buf))
}
