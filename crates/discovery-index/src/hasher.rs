//! Content digests for source files.

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

/// Digest recorded for a file that could not be read.
///
/// Never equal to a real digest, so an unreadable file always shows up as changed.
pub const MISSING_HASH: &str = "MISSING";

/// Number of hex characters kept from the SHA-256 digest.
pub const HASH_LEN: usize = 16;

/// Hash a file's text content.
///
/// Returns [`MISSING_HASH`] instead of an error when the file cannot be read.
pub fn hash_file(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => hash_content(&content),
        Err(e) => {
            debug!("Cannot read {:?} for hashing: {}", path, e);
            MISSING_HASH.to_string()
        }
    }
}

/// Hash a string, truncated to [`HASH_LEN`] hex characters.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}
