//! Deterministic hashing for PII lookup and uniqueness.
//!
//! The digest is keyless and version-free on purpose: encrypted columns
//! rotate with the key generation, but the hash column backing unique
//! indexes must stay stable across rotations so existing indexes and
//! lookups keep working.

use sha2::{Digest, Sha256};

/// SHA-256 over the UTF-8 bytes of `plaintext`, as 64 lowercase hex chars.
///
/// Returns `None` for empty input so optional fields hash to an absent
/// column rather than the digest of the empty string.
pub fn sha256_hex(plaintext: &str) -> Option<String> {
    if plaintext.is_empty() {
        return None;
    }
    let digest = Sha256::digest(plaintext.as_bytes());
    Some(hex::encode(digest))
}
