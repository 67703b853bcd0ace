// crates/fieldpack-core/src/core/allowlist.rs
// ============================================================================
// Module: Fieldpack Toolchain Allowlist
// Description: Trusted producer identities and their public key files.
// Purpose: Resolve a bundle's claimed toolchain id to a trust root.
// Dependencies: crate::core::{hashing, keys}, serde, serde_yaml
// ============================================================================

//! ## Overview
//! The allowlist maps `toolchain_id` to a public key path. Relative key
//! paths resolve against the directory holding the allowlist file. The
//! allowlist hash covers the document only, never the resolution directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::canonical_sha256_hex;
use crate::core::keys::KeyError;
use crate::core::keys::PublicKey;
use crate::core::keys::load_public_key;
use crate::core::policy::PolicyError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One trusted producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainEntry {
    /// Producer identity.
    pub id: String,
    /// Public key file path.
    pub pubkey_path: String,
}

/// Allowlist body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistBody {
    /// Trusted producers.
    #[serde(default)]
    pub toolchain_ids: Vec<ToolchainEntry>,
}

/// Allowlist document with its resolution directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowlist {
    /// Document body.
    #[serde(default)]
    pub allowlist: AllowlistBody,
    /// Directory used to resolve relative key paths.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Allowlist {
    /// Builds an allowlist from entries, resolving paths against `base_dir`.
    #[must_use]
    pub fn new(entries: Vec<ToolchainEntry>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            allowlist: AllowlistBody {
                toolchain_ids: entries,
            },
            base_dir: base_dir.into(),
        }
    }

    /// Parses a YAML (or JSON) document.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] when the document is malformed.
    pub fn from_yaml_str(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        let mut allowlist: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text).map_err(|err| PolicyError::Parse(err.to_string()))?
        };
        allowlist.base_dir = base_dir.into();
        Ok(allowlist)
    }

    /// Loads an allowlist file; key paths resolve against its directory.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = fs::read_to_string(path)
            .map_err(|err| PolicyError::Io(format!("{}: {err}", path.display())))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_yaml_str(&text, base_dir)
    }

    /// Canonical hash of the document.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Hash`] when canonicalization fails.
    pub fn canonical_hash(&self) -> Result<String, PolicyError> {
        canonical_sha256_hex(self).map_err(|err| PolicyError::Hash(err.to_string()))
    }

    /// Looks up a producer.
    #[must_use]
    pub fn entry(&self, toolchain_id: &str) -> Option<&ToolchainEntry> {
        self.allowlist.toolchain_ids.iter().find(|entry| entry.id == toolchain_id)
    }

    /// Resolved public key path for an entry.
    #[must_use]
    pub fn key_path(&self, entry: &ToolchainEntry) -> PathBuf {
        let path = Path::new(&entry.pubkey_path);
        if path.is_absolute() { path.to_path_buf() } else { self.base_dir.join(path) }
    }

    /// Loads the trust root for `toolchain_id`; `None` when not allow-listed.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the key file is unreadable or malformed.
    pub fn trust_root(&self, toolchain_id: &str) -> Result<Option<PublicKey>, KeyError> {
        match self.entry(toolchain_id) {
            Some(entry) => load_public_key(&self.key_path(entry)).map(Some),
            None => Ok(None),
        }
    }
}
