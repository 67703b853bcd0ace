// crates/fieldpack-core/src/core/cas.rs
// ============================================================================
// Module: Fieldpack Content-Addressable Store
// Description: Write-if-absent blob storage keyed by SHA-256 digest.
// Purpose: Hold raw, extracted, and auxiliary material before sealing.
// Dependencies: crate::core::hashing, tempfile, thiserror
// ============================================================================

//! ## Overview
//! The CAS partitions blobs by [`CasKind`] under
//! `<root>/{blobs,extracts,aux}/sha256/<digest>`. There is no update or
//! delete: [`ContentStore::put`] is idempotent and never overwrites an
//! existing object, so concurrent identical writers race harmlessly.
//! Objects are written to a temporary file in the target directory and moved
//! into place without clobbering.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::is_sha256_hex;
use crate::core::hashing::sha256_hex;

// ============================================================================
// SECTION: Kinds
// ============================================================================

/// Partition of the content-addressable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasKind {
    /// Raw ingested input.
    Raw,
    /// Derived or extracted text.
    Extract,
    /// Auxiliary material such as transcripts.
    Aux,
}

impl CasKind {
    /// All kinds in sealing order.
    pub const ALL: [Self; 3] = [Self::Raw, Self::Extract, Self::Aux];

    /// Directory name inside the CAS root.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Raw => "blobs",
            Self::Extract => "extracts",
            Self::Aux => "aux",
        }
    }

    /// Archive prefix used for bundle entries of this kind.
    #[must_use]
    pub const fn entry_prefix(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Extract => "extract",
            Self::Aux => "aux",
        }
    }

    /// Parses a kind label (`raw`, `extract`, `aux`).
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "raw" => Some(Self::Raw),
            "extract" => Some(Self::Extract),
            "aux" => Some(Self::Aux),
            _ => None,
        }
    }

    /// Returns the archive entry name for a blob digest.
    #[must_use]
    pub fn entry_name(self, digest: &str) -> String {
        format!("{}/{}/{digest}", self.entry_prefix(), DEFAULT_HASH_ALGORITHM.label())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Content store errors.
#[derive(Debug, Error)]
pub enum CasError {
    /// Filesystem failure.
    #[error("cas io error: {0}")]
    Io(String),
    /// Requested object is absent.
    #[error("cas object not found: {}/{digest}", .kind.dir_name())]
    NotFound {
        /// Partition searched.
        kind: CasKind,
        /// Requested digest.
        digest: String,
    },
    /// Digest is not a lowercase SHA-256 hex string.
    #[error("invalid cas digest: {0}")]
    InvalidDigest(String),
    /// Stored object no longer matches its digest.
    #[error("cas object corrupt: {0}")]
    Corrupt(String),
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Filesystem-backed content-addressable store.
#[derive(Debug, Clone)]
pub struct ContentStore {
    /// Root directory for all partitions.
    root: PathBuf,
}

impl ContentStore {
    /// Creates a handle rooted at `root` (no I/O is performed).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    /// Returns the store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the partitioned directory layout.
    ///
    /// # Errors
    ///
    /// Returns [`CasError::Io`] when a directory cannot be created.
    pub fn init(&self) -> Result<(), CasError> {
        for kind in CasKind::ALL {
            fs::create_dir_all(self.kind_dir(kind)).map_err(|err| CasError::Io(err.to_string()))?;
        }
        Ok(())
    }

    /// Stores `bytes` under `kind` and returns the digest.
    ///
    /// Writing an object that already exists performs no write.
    ///
    /// # Errors
    ///
    /// Returns [`CasError::Io`] when the object cannot be persisted.
    pub fn put(&self, bytes: &[u8], kind: CasKind) -> Result<String, CasError> {
        let digest = sha256_hex(bytes);
        let dir = self.kind_dir(kind);
        let target = dir.join(&digest);
        if target.is_file() {
            return Ok(digest);
        }
        fs::create_dir_all(&dir).map_err(|err| CasError::Io(err.to_string()))?;
        let mut temp = NamedTempFile::new_in(&dir).map_err(|err| CasError::Io(err.to_string()))?;
        temp.write_all(bytes).map_err(|err| CasError::Io(err.to_string()))?;
        temp.as_file().sync_all().map_err(|err| CasError::Io(err.to_string()))?;
        match temp.persist_noclobber(&target) {
            Ok(_) => Ok(digest),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => Ok(digest),
            Err(err) => Err(CasError::Io(err.error.to_string())),
        }
    }

    /// Reads the object stored under `digest` in `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`CasError::NotFound`] when absent and [`CasError::Corrupt`]
    /// when the stored bytes no longer hash to `digest`.
    pub fn get(&self, digest: &str, kind: CasKind) -> Result<Vec<u8>, CasError> {
        if !is_sha256_hex(digest) {
            return Err(CasError::InvalidDigest(digest.to_string()));
        }
        let path = self.kind_dir(kind).join(digest);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CasError::NotFound {
                    kind,
                    digest: digest.to_string(),
                });
            }
            Err(err) => return Err(CasError::Io(err.to_string())),
        };
        if sha256_hex(&bytes) != digest {
            return Err(CasError::Corrupt(format!("{}/{digest}", kind.dir_name())));
        }
        Ok(bytes)
    }

    /// Returns true when an object exists under `digest` in `kind`.
    #[must_use]
    pub fn contains(&self, digest: &str, kind: CasKind) -> bool {
        is_sha256_hex(digest) && self.kind_dir(kind).join(digest).is_file()
    }

    /// Lists stored digests for `kind` in ascending order.
    ///
    /// Temporary files and foreign names are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CasError::Io`] when the directory cannot be read.
    pub fn list(&self, kind: CasKind) -> Result<Vec<String>, CasError> {
        let dir = self.kind_dir(kind);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut digests = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|err| CasError::Io(err.to_string()))? {
            let entry = entry.map_err(|err| CasError::Io(err.to_string()))?;
            let file_type = entry.file_type().map_err(|err| CasError::Io(err.to_string()))?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && is_sha256_hex(name)
            {
                digests.push(name.to_string());
            }
        }
        digests.sort();
        Ok(digests)
    }

    /// Directory holding objects of `kind`.
    fn kind_dir(&self, kind: CasKind) -> PathBuf {
        self.root.join(kind.dir_name()).join(DEFAULT_HASH_ALGORITHM.label())
    }
}
