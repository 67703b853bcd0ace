// crates/fieldpack-core/src/core/keys.rs
// ============================================================================
// Module: Fieldpack Signing Keys
// Description: Typed Ed25519 key pair, key-id derivation, and key files.
// Purpose: Keep signing, verification, and key identity separately testable.
// Dependencies: base64, ed25519-dalek, rand, sha2
// ============================================================================

//! ## Overview
//! Keys are stored as base64 text of the raw 32-byte Ed25519 secret seed or
//! public key; raw 32-byte files are also accepted. The key id is the SHA-256
//! hex of the raw public key bytes, so it is independent of file encoding.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::core::hashing::sha256_hex;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of a key file.
const MAX_KEY_FILE_BYTES: u64 = 4096;
/// Raw Ed25519 key length.
const KEY_LEN: usize = 32;
/// Unix mode for private key files.
#[cfg(unix)]
const PRIVATE_KEY_MODE: u32 = 0o600;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key handling errors.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Key file could not be read or written.
    #[error("key io error at {path}: {error}")]
    Io {
        /// Key path.
        path: String,
        /// Underlying error.
        error: String,
    },
    /// Key material is not a valid Ed25519 key.
    #[error("invalid key material at {0}")]
    Invalid(String),
    /// Public key file does not match the private key.
    #[error("public key does not match private key at {0}")]
    Mismatch(String),
}

// ============================================================================
// SECTION: Key Pair
// ============================================================================

/// Ed25519 signing key pair.
#[derive(Debug, Clone)]
pub struct Ed25519KeyPair {
    /// Secret signing key.
    signing: SigningKey,
}

impl Ed25519KeyPair {
    /// Generates a key pair from the OS random number generator.
    #[must_use]
    pub fn generate() -> Self {
        let mut seed = [0_u8; KEY_LEN];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Builds a key pair from a 32-byte secret seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; KEY_LEN]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Signs `message` and returns the 64-byte signature.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }

    /// Public half of the key pair.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key())
    }

    /// Key id of the public half.
    #[must_use]
    pub fn key_id(&self) -> String {
        self.public_key().key_id()
    }

    /// Secret seed encoded as base64 text.
    fn seed_base64(&self) -> String {
        BASE64.encode(self.signing.to_bytes())
    }
}

/// Ed25519 public key used as a trust root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parses a raw 32-byte public key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Invalid`] when the bytes are not a valid point.
    pub fn from_bytes(bytes: &[u8; KEY_LEN]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| KeyError::Invalid("public key bytes".to_string()))
    }

    /// Raw public key bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0.to_bytes()
    }

    /// Stable key id: SHA-256 hex of the raw public key bytes.
    #[must_use]
    pub fn key_id(&self) -> String {
        sha256_hex(&self.0.to_bytes())
    }

    /// Returns true when `signature` is a valid strict signature of `message`.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.0.verify_strict(message, &signature).is_ok()
    }

    /// Public key encoded as base64 text.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0.to_bytes())
    }
}

// ============================================================================
// SECTION: Key Files
// ============================================================================

/// Reads raw key bytes from a base64 text or raw 32-byte file.
fn read_key_bytes(path: &Path) -> Result<[u8; KEY_LEN], KeyError> {
    let io_err = |error: std::io::Error| KeyError::Io {
        path: path.display().to_string(),
        error: error.to_string(),
    };
    let metadata = fs::metadata(path).map_err(io_err)?;
    if metadata.len() > MAX_KEY_FILE_BYTES {
        return Err(KeyError::Invalid(path.display().to_string()));
    }
    let bytes = fs::read(path).map_err(io_err)?;
    if let Ok(raw) = <[u8; KEY_LEN]>::try_from(bytes.as_slice()) {
        return Ok(raw);
    }
    let text =
        std::str::from_utf8(&bytes).map_err(|_| KeyError::Invalid(path.display().to_string()))?;
    let decoded = BASE64
        .decode(text.trim().as_bytes())
        .map_err(|_| KeyError::Invalid(path.display().to_string()))?;
    <[u8; KEY_LEN]>::try_from(decoded.as_slice())
        .map_err(|_| KeyError::Invalid(path.display().to_string()))
}

/// Writes base64 key text, creating parent directories.
///
/// Private key files are owner read/write only on unix, including when an
/// existing file is truncated.
fn write_key_text(path: &Path, text: &str, private: bool) -> Result<(), KeyError> {
    let io_err = |error: std::io::Error| KeyError::Io {
        path: path.display().to_string(),
        error: error.to_string(),
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_KEY_MODE);
    }
    let mut file = options.open(path).map_err(io_err)?;
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(PRIVATE_KEY_MODE)).map_err(io_err)?;
    }
    #[cfg(not(unix))]
    let _ = private;
    file.write_all(format!("{text}\n").as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}

/// Loads a signing key pair from its private key file.
///
/// # Errors
///
/// Returns [`KeyError`] when the file is unreadable or malformed.
pub fn load_signing_key(path: &Path) -> Result<Ed25519KeyPair, KeyError> {
    let seed = read_key_bytes(path)?;
    Ok(Ed25519KeyPair::from_seed(&seed))
}

/// Loads a public key file.
///
/// # Errors
///
/// Returns [`KeyError`] when the file is unreadable or malformed.
pub fn load_public_key(path: &Path) -> Result<PublicKey, KeyError> {
    let bytes = read_key_bytes(path)?;
    PublicKey::from_bytes(&bytes).map_err(|_| KeyError::Invalid(path.display().to_string()))
}

/// Loads the key pair at `private_path`/`public_path`.
///
/// A missing public key is re-derived from an existing private key; the
/// private key is never overwritten. A fresh pair is generated only when the
/// private key is absent.
///
/// # Errors
///
/// Returns [`KeyError`] when existing files are malformed, disagree, or new
/// files cannot be written.
pub fn load_or_create(private_path: &Path, public_path: &Path) -> Result<Ed25519KeyPair, KeyError> {
    if private_path.is_file() {
        let pair = load_signing_key(private_path)?;
        if public_path.is_file() {
            let public = load_public_key(public_path)?;
            if pair.public_key() != public {
                return Err(KeyError::Mismatch(public_path.display().to_string()));
            }
        } else {
            write_key_text(public_path, &pair.public_key().to_base64(), false)?;
        }
        return Ok(pair);
    }
    let pair = Ed25519KeyPair::generate();
    write_key_text(private_path, &pair.seed_base64(), true)?;
    write_key_text(public_path, &pair.public_key().to_base64(), false)?;
    Ok(pair)
}
