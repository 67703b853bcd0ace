// crates/fieldpack-core/src/runtime/archive.rs
// ============================================================================
// Module: Fieldpack Bundle Archive
// Description: Deterministic tar writer and bounded tar reader.
// Purpose: Produce byte-stable bundle archives and read them back safely.
// Dependencies: tar, tempfile
// ============================================================================

//! ## Overview
//! Bundles are plain tar archives. The writer sorts entries by name and pins
//! every header field that could vary between hosts (mode, owner, mtime), so
//! identical logical inputs always produce identical bytes. Archives are
//! written to a temporary file in the destination directory and renamed into
//! place only after the last byte is flushed.
//!
//! The reader works in two passes: [`list_members`] inspects headers without
//! reading contents so size and name gates can run first, then
//! [`read_members`] loads contents once the archive has passed those gates.
//! Consumers that act on what they verified load the file once with
//! [`read_bundle_bytes`] and run both passes over that buffer through
//! [`list_members_from`] and [`read_members_from`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tar::Archive;
use tar::Builder;
use tar::EntryType;
use tar::Header;
use tempfile::NamedTempFile;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed entry modification time (1980-01-01T00:00:00Z).
pub const FIXED_MTIME: u64 = 315_532_800;
/// Fixed entry permission bits.
const FIXED_MODE: u32 = 0o644;
/// Maximum bundle label length.
const MAX_LABEL_LEN: usize = 64;
/// Archive file name prefix.
const BUNDLE_FILE_PREFIX: &str = "fieldpack_bundle";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Archive read and write failures.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Filesystem or tar stream failure.
    #[error("archive io error: {0}")]
    Io(String),
    /// Entry name is not representable in the archive.
    #[error("invalid archive entry name: {0}")]
    InvalidName(String),
    /// Bundle label contains unsupported characters.
    #[error("invalid bundle label: {0}")]
    InvalidLabel(String),
    /// Final archive path already exists.
    #[error("bundle already exists: {0}")]
    AlreadyExists(String),
    /// Archive file exceeds the read cap.
    #[error("bundle is {size} bytes (limit {limit})")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed size in bytes.
        limit: u64,
    },
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// ============================================================================
// SECTION: Names
// ============================================================================

/// Returns true when an archive member name is a safe relative path.
///
/// Rejects empty names, absolute paths, backslashes, drive prefixes, empty
/// segments, and `.` or `..` segments.
#[must_use]
pub fn is_safe_member_name(name: &str) -> bool {
    let trimmed = name.strip_suffix('/').unwrap_or(name);
    if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.contains('\\') {
        return false;
    }
    let mut segments = trimmed.split('/').peekable();
    if segments.peek().is_some_and(|first| first.contains(':')) {
        return false;
    }
    segments.all(|segment| !matches!(segment, "" | "." | ".."))
}

/// Validates a bundle label: 1 to 64 characters from `[A-Za-z0-9._-]`.
///
/// # Errors
///
/// Returns [`ArchiveError::InvalidLabel`] when the label is rejected.
pub fn validate_label(label: &str) -> Result<(), ArchiveError> {
    let valid = !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && label.bytes().all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-'));
    if valid { Ok(()) } else { Err(ArchiveError::InvalidLabel(label.to_string())) }
}

/// Archive file name for a label and compact timestamp.
#[must_use]
pub fn bundle_file_name(label: &str, compact_timestamp: &str) -> String {
    format!("{BUNDLE_FILE_PREFIX}_{label}_{compact_timestamp}.tar")
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Writes `entries` as a deterministic archive at `out_dir/file_name`.
///
/// The destination must not exist; sealing never overwrites a bundle.
///
/// # Errors
///
/// Returns [`ArchiveError`] when a name is unsafe or any write fails. No file
/// is visible under the final name on failure.
pub fn write_archive(
    out_dir: &Path,
    file_name: &str,
    entries: &BTreeMap<String, Vec<u8>>,
) -> Result<PathBuf, ArchiveError> {
    std::fs::create_dir_all(out_dir)?;
    let final_path = out_dir.join(file_name);
    let temp = NamedTempFile::new_in(out_dir)?;
    {
        let mut builder = Builder::new(BufWriter::new(temp.as_file()));
        for (name, bytes) in entries {
            if !is_safe_member_name(name) {
                return Err(ArchiveError::InvalidName(name.clone()));
            }
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(bytes.len() as u64);
            header.set_mode(FIXED_MODE);
            header.set_uid(0);
            header.set_gid(0);
            header.set_mtime(FIXED_MTIME);
            builder.append_data(&mut header, name, bytes.as_slice())?;
        }
        let mut writer = builder.into_inner()?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist_noclobber(&final_path).map_err(|err| {
        if err.error.kind() == std::io::ErrorKind::AlreadyExists {
            ArchiveError::AlreadyExists(final_path.display().to_string())
        } else {
            ArchiveError::Io(err.error.to_string())
        }
    })?;
    Ok(final_path)
}

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Archive member header summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Raw member name (lossy UTF-8).
    pub name: String,
    /// Declared content size in bytes.
    pub size: u64,
    /// True for regular files.
    pub regular: bool,
}

/// Reads a whole archive file into memory, refusing files above `max_bytes`.
///
/// # Errors
///
/// Returns [`ArchiveError::TooLarge`] over the cap and [`ArchiveError::Io`]
/// when the file cannot be read.
pub fn read_bundle_bytes(path: &Path, max_bytes: u64) -> Result<Vec<u8>, ArchiveError> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    if size > max_bytes {
        return Err(ArchiveError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(max_bytes.saturating_add(1)).read_to_end(&mut bytes)?;
    let read = bytes.len() as u64;
    if read > max_bytes {
        return Err(ArchiveError::TooLarge {
            size: read,
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Lists member headers in archive order without reading contents.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] when the file is unreadable or not a tar stream.
pub fn list_members(path: &Path) -> Result<Vec<ArchiveMember>, ArchiveError> {
    list_members_from(BufReader::new(File::open(path)?))
}

/// Lists member headers from any tar stream, such as an in-memory buffer.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] when the stream is not a tar archive.
pub fn list_members_from<R: Read>(reader: R) -> Result<Vec<ArchiveMember>, ArchiveError> {
    let mut archive = Archive::new(reader);
    let mut members = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let header = entry.header();
        members.push(ArchiveMember {
            name: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
            size: header.size()?,
            regular: header.entry_type().is_file(),
        });
    }
    Ok(members)
}

/// Reads every regular member into memory, keyed by name.
///
/// Callers run [`list_members`] gates first; a later duplicate replaces an
/// earlier one here.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] when the file is unreadable or not a tar stream.
pub fn read_members(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    read_members_from(BufReader::new(File::open(path)?))
}

/// Reads every regular member of any tar stream, keyed by name.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] when the stream is not a tar archive.
pub fn read_members_from<R: Read>(reader: R) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    let mut archive = Archive::new(reader);
    let mut members = BTreeMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        members.insert(name, bytes);
    }
    Ok(members)
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

    use super::*;

    #[test]
    fn member_name_rules() {
        assert!(is_safe_member_name("manifest.json"));
        assert!(is_safe_member_name("raw/sha256/abc"));
        assert!(!is_safe_member_name(""));
        assert!(!is_safe_member_name("/etc/passwd"));
        assert!(!is_safe_member_name("../escape"));
        assert!(!is_safe_member_name("a/./b"));
        assert!(!is_safe_member_name("a//b"));
        assert!(!is_safe_member_name("a\\b"));
        assert!(!is_safe_member_name("C:/windows"));
    }

    #[test]
    fn label_rules() {
        assert!(validate_label("nightly-1.0_a").is_ok());
        assert!(validate_label("").is_err());
        assert!(validate_label("has space").is_err());
        assert!(validate_label(&"x".repeat(65)).is_err());
    }

    #[test]
    fn archives_are_byte_stable_and_never_overwritten() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut entries = BTreeMap::new();
        entries.insert("b.txt".to_string(), b"bee".to_vec());
        entries.insert("a/one.txt".to_string(), b"one".to_vec());

        let first = write_archive(&dir.path().join("x"), "bundle.tar", &entries).unwrap();
        let second = write_archive(&dir.path().join("y"), "bundle.tar", &entries).unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());

        let again = write_archive(&dir.path().join("x"), "bundle.tar", &entries);
        assert!(matches!(again, Err(ArchiveError::AlreadyExists(_))));

        let members = list_members(&first).unwrap();
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a/one.txt", "b.txt"]);
        assert!(members.iter().all(|m| m.regular));
        assert_eq!(read_members(&first).unwrap(), entries);
    }

    #[test]
    fn buffered_reads_match_file_reads_and_honor_the_cap() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut entries = BTreeMap::new();
        entries.insert("kg_delta.jsonl".to_string(), b"{}".to_vec());
        let path = write_archive(dir.path(), "bundle.tar", &entries).unwrap();

        let bytes = read_bundle_bytes(&path, 1 << 20).unwrap();
        assert_eq!(bytes, std::fs::read(&path).unwrap());
        assert_eq!(list_members_from(bytes.as_slice()).unwrap(), list_members(&path).unwrap());
        assert_eq!(read_members_from(bytes.as_slice()).unwrap(), entries);

        let limit = bytes.len() as u64 - 1;
        assert!(matches!(
            read_bundle_bytes(&path, limit),
            Err(ArchiveError::TooLarge { limit: reported, .. }) if reported == limit
        ));
    }
}
