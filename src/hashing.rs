//! Conventional exact-hash fingerprints.
//!
//! Used purely for change detection on tracked artifacts; the similarity
//! digest lives in [`crate::digest`] and is a different animal entirely.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 fingerprint of the given data and returns it as a hex string.
pub fn sha256_fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
