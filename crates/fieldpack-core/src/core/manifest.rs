// crates/fieldpack-core/src/core/manifest.rs
// ============================================================================
// Module: Fieldpack Bundle Manifest
// Description: Manifest and attestation documents plus archive entry names.
// Purpose: Define the signed metadata that binds every bundle entry.
// Dependencies: crate::core::hashing, serde
// ============================================================================

//! ## Overview
//! The manifest maps every content entry to its SHA-256 and carries the
//! derived `bundle_map_hash`. The attestation binds the manifest bytes, the
//! governance hashes, and the per-category digests, and is what the producer
//! signs. Meta entries (manifest, attestation, signatures, envelopes) live
//! outside the manifest's file map to avoid circular hashing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashError;
use crate::core::hashing::canonical_sha256_hex;

// ============================================================================
// SECTION: Entry Names
// ============================================================================

/// Manifest entry.
pub const MANIFEST_ENTRY: &str = "manifest.json";
/// Attestation entry.
pub const ATTESTATION_ENTRY: &str = "attestation.json";
/// Detached attestation signature entry.
pub const SIGNATURE_ENTRY: &str = "attestation.sig";
/// Build DSSE envelope entry.
pub const ATTESTATION_DSSE_ENTRY: &str = "attestation.dsse.json";
/// CycloneDX SBOM entry.
pub const SBOM_ENTRY: &str = "sbom/bom.cdx.json";
/// SBOM DSSE envelope entry.
pub const SBOM_DSSE_ENTRY: &str = "sbom/bom.dsse.json";
/// Provenance log entry.
pub const PROVENANCE_ENTRY: &str = "provenance.jsonl";
/// Graph delta entry.
pub const KG_DELTA_ENTRY: &str = "kg_delta.jsonl";
/// Component interface contract entry.
pub const STUDSPEC_ENTRY: &str = "studspec.json";
/// Runtime environment contract entry.
pub const TUBESPEC_ENTRY: &str = "tubespec.json";

/// Entries permitted outside the manifest file map.
pub const META_ENTRY_NAMES: [&str; 5] =
    [MANIFEST_ENTRY, ATTESTATION_ENTRY, SIGNATURE_ENTRY, ATTESTATION_DSSE_ENTRY, SBOM_DSSE_ENTRY];

/// Current manifest version.
pub const MANIFEST_VERSION: &str = "2";
/// Current attestation version; older versions use the legacy signing message.
pub const ATTESTATION_VERSION: &str = "2";
/// Signature algorithm label.
pub const SIGNATURE_ALGORITHM: &str = "ed25519";
/// Signing schema label for whole-attestation signatures.
pub const SIGNING_SCHEMA: &str = "ed25519_canonical_attestation_v2";

// ============================================================================
// SECTION: Documents
// ============================================================================

/// Bundle manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest version.
    pub manifest_version: String,
    /// Producer identity.
    pub toolchain_id: String,
    /// RFC 3339 sealing time.
    pub created_utc: String,
    /// Entry name to SHA-256.
    pub files: BTreeMap<String, String>,
    /// Hash of the sorted file map.
    pub bundle_map_hash: String,
    /// Producer policy hash.
    pub policy_hash: Option<String>,
    /// Producer allowlist hash.
    pub allowlist_hash: Option<String>,
    /// SBOM entry hash.
    pub sbom_hash: Option<String>,
    /// Provenance entry hash.
    pub provenance_hash: Option<String>,
    /// Graph delta entry hash.
    pub kg_delta_hash: Option<String>,
}

/// Signed bundle attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Attestation version.
    pub attestation_version: String,
    /// Producer identity.
    pub toolchain_id: String,
    /// Bundle label.
    pub label: String,
    /// Hash of the sorted file map.
    pub bundle_map_hash: String,
    /// SHA-256 of the manifest entry bytes.
    pub manifest_hash: String,
    /// Producer policy hash.
    pub policy_hash: Option<String>,
    /// Producer allowlist hash.
    pub allowlist_hash: Option<String>,
    /// SBOM entry hash.
    pub sbom_hash: Option<String>,
    /// Provenance entry hash.
    pub provenance_hash: Option<String>,
    /// Graph delta entry hash.
    pub kg_delta_hash: Option<String>,
    /// RFC 3339 sealing time.
    pub created_utc: String,
    /// Signature algorithm.
    pub algo: String,
    /// Signing schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_schema: Option<String>,
}

// ============================================================================
// SECTION: Hash Helpers
// ============================================================================

/// Computes `bundle_map_hash` over a sorted file map.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn bundle_map_hash(files: &BTreeMap<String, String>) -> Result<String, HashError> {
    canonical_sha256_hex(files)
}

/// Message signed by pre-v2 attestations:
/// `bundle_map_hash|sbom_hash|provenance_hash`.
#[must_use]
pub fn legacy_signing_message(
    bundle_map_hash: &str,
    sbom_hash: &str,
    provenance_hash: &str,
) -> Vec<u8> {
    format!("{bundle_map_hash}|{sbom_hash}|{provenance_hash}").into_bytes()
}
