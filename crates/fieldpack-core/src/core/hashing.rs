// crates/fieldpack-core/src/core/hashing.rs
// ============================================================================
// Module: Fieldpack Canonical Codec
// Description: RFC 8785 JSON canonicalization and SHA-256 content hashing.
// Purpose: Single source of bytes for every manifest, chain, and snapshot hash.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Every hash Fieldpack computes goes through this module. Structured values
//! are serialized with RFC 8785 (JCS): sorted keys, no insignificant
//! whitespace, UTF-8, and shortest round-trip number formatting. Raw blobs are
//! hashed directly over their bytes.
//!
//! Hash chains never concatenate strings by hand. A chain link is the
//! canonical JSON of `{ "prev_hash": <hex|null>, "content": <row> }`, which
//! keeps the previous hash and the row content unambiguously delimited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Supported hash algorithms for Fieldpack artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 (the only algorithm bundles may declare).
    Sha256,
}

impl HashAlgorithm {
    /// Returns the label used in archive paths and in-toto digest maps.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

/// Default hash algorithm for Fieldpack.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// Length of a lowercase hex SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Deterministic content hash representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_encode(bytes),
        }
    }

    /// Consumes the digest and returns its hex value.
    #[must_use]
    pub fn into_hex(self) -> String {
        self.value
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed (for example a non-finite float).
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Canonical Serialization
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Returns canonical JSON bytes followed by a single newline.
///
/// This is the on-archive encoding of every JSON entry Fieldpack writes.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_line<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    let mut bytes = canonical_json_bytes(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Hashes canonical JSON using the provided algorithm.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes using the provided algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest::new(HashAlgorithm::Sha256, &digest)
        }
    }
}

/// Returns the lowercase hex SHA-256 of raw bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, bytes).into_hex()
}

/// Returns the lowercase hex SHA-256 of a value's canonical JSON.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_sha256_hex<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    Ok(hash_canonical_json(HashAlgorithm::Sha256, value)?.into_hex())
}

// ============================================================================
// SECTION: Hash Chains
// ============================================================================

/// Canonical envelope hashed for each hash-chain link.
#[derive(Serialize)]
struct ChainLink<'a, T: Serialize + ?Sized> {
    /// Hash of the previous link, `None` for the first row.
    prev_hash: Option<&'a str>,
    /// Canonical row content.
    content: &'a T,
}

/// Computes `digest(prev_hash ∥ canonical(content))` for a ledger row.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when the content cannot be
/// canonicalized.
pub fn chain_hash<T: Serialize + ?Sized>(
    prev_hash: Option<&str>,
    content: &T,
) -> Result<String, HashError> {
    canonical_sha256_hex(&ChainLink {
        prev_hash,
        content,
    })
}

/// Returns true when `value` is a lowercase hex SHA-256 digest.
#[must_use]
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == SHA256_HEX_LEN && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use serde_json::json;

    use super::*;

    #[test]
    fn chain_hash_depends_on_previous_link() {
        let row = json!({"a": 1});
        let first = chain_hash(None, &row).unwrap();
        let second = chain_hash(Some(&first), &row).unwrap();
        assert_ne!(first, second);
        assert!(is_sha256_hex(&first));
    }

    #[test]
    fn hex_digest_shape_is_checked() {
        assert!(is_sha256_hex(&sha256_hex(b"abc")));
        assert!(!is_sha256_hex("ABC"));
        assert!(!is_sha256_hex(&"G".repeat(SHA256_HEX_LEN)));
    }
}
