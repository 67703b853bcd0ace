// crates/fieldpack-core/src/runtime/sealer.rs
// ============================================================================
// Module: Fieldpack Bundle Sealer
// Description: Deterministic bundle assembly, attestation, and signing.
// Purpose: Seal CAS content, logs, and an SBOM into a signed archive.
// Dependencies: crate::{core, interfaces, audit}, base64, serde_json
// ============================================================================

//! ## Overview
//! Sealing collects every included CAS blob plus the provenance log, the
//! graph delta, interface contracts, and a CycloneDX SBOM; hashes each entry
//! into the manifest file map; then derives the attestation, its detached
//! signature, and two DSSE envelopes. The creation time is an explicit input,
//! so the same logical inputs always yield the same archive bytes.
//!
//! Security posture: an enabled signer without key material is a hard error.
//! No unsigned bundle is produced when signing is enabled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::audit::BundleSealedEvent;
use crate::audit::BundleSealedEventParams;
use crate::audit::FieldpackAuditSink;
use crate::core::cas::CasError;
use crate::core::cas::CasKind;
use crate::core::cas::ContentStore;
use crate::core::contracts::ContractKind;
use crate::core::contracts::validate_contract;
use crate::core::delta::DeltaError;
use crate::core::delta::canonical_jsonl;
use crate::core::dsse::BUILD_PREDICATE_TYPE;
use crate::core::dsse::DsseError;
use crate::core::dsse::SBOM_PREDICATE_TYPE;
use crate::core::dsse::Statement;
use crate::core::dsse::Subject;
use crate::core::dsse::sign_statement;
use crate::core::hashing::HashError;
use crate::core::hashing::canonical_json_line;
use crate::core::hashing::sha256_hex;
use crate::core::keys::Ed25519KeyPair;
use crate::core::manifest::ATTESTATION_DSSE_ENTRY;
use crate::core::manifest::ATTESTATION_ENTRY;
use crate::core::manifest::ATTESTATION_VERSION;
use crate::core::manifest::Attestation;
use crate::core::manifest::KG_DELTA_ENTRY;
use crate::core::manifest::MANIFEST_ENTRY;
use crate::core::manifest::MANIFEST_VERSION;
use crate::core::manifest::Manifest;
use crate::core::manifest::PROVENANCE_ENTRY;
use crate::core::manifest::SBOM_DSSE_ENTRY;
use crate::core::manifest::SBOM_ENTRY;
use crate::core::manifest::SIGNATURE_ALGORITHM;
use crate::core::manifest::SIGNATURE_ENTRY;
use crate::core::manifest::SIGNING_SCHEMA;
use crate::core::manifest::bundle_map_hash;
use crate::core::provenance::ProvenanceLog;
use crate::core::sbom::CYCLONEDX_FORMAT;
use crate::core::sbom::build_cyclonedx_bom;
use crate::core::time::TimeError;
use crate::core::time::UtcTimestamp;
use crate::runtime::archive::ArchiveError;
use crate::runtime::archive::bundle_file_name;
use crate::runtime::archive::validate_label;
use crate::runtime::archive::write_archive;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Per-category inclusion switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Each flag toggles one independent bundle category."
)]
pub struct InclusionFlags {
    /// Include `raw/sha256/*` blobs.
    pub raw: bool,
    /// Include `extract/sha256/*` blobs.
    pub extract: bool,
    /// Include `aux/sha256/*` blobs.
    pub aux: bool,
    /// Include `provenance.jsonl`.
    pub provenance: bool,
    /// Include `kg_delta.jsonl`.
    pub kg_delta: bool,
    /// Include the CycloneDX SBOM and its envelope.
    pub sbom: bool,
}

impl Default for InclusionFlags {
    fn default() -> Self {
        Self {
            raw: true,
            extract: true,
            aux: true,
            provenance: true,
            kg_delta: true,
            sbom: true,
        }
    }
}

impl InclusionFlags {
    /// Returns whether blobs of `kind` are included.
    const fn includes(self, kind: CasKind) -> bool {
        match kind {
            CasKind::Raw => self.raw,
            CasKind::Extract => self.extract,
            CasKind::Aux => self.aux,
        }
    }
}

/// Logical inputs of one seal.
#[derive(Debug, Clone)]
pub struct SealRequest {
    /// Producer identity.
    pub toolchain_id: String,
    /// Bundle label (`[A-Za-z0-9._-]{1,64}`).
    pub label: String,
    /// Sealing time recorded in every document.
    pub created_utc: UtcTimestamp,
    /// Producer policy hash.
    pub policy_hash: Option<String>,
    /// Producer allowlist hash.
    pub allowlist_hash: Option<String>,
    /// Provenance JSONL; a one-event seal log is generated when absent.
    pub provenance_jsonl: Option<String>,
    /// Graph delta JSONL; empty when absent.
    pub kg_delta_jsonl: Option<String>,
    /// Interface contracts to embed at the archive root.
    pub contracts: Vec<(ContractKind, Vec<u8>)>,
}

/// Result of a successful seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBundle {
    /// Final archive path.
    pub path: PathBuf,
    /// Hash of the manifest file map.
    pub bundle_map_hash: String,
    /// SHA-256 of the manifest entry bytes.
    pub manifest_hash: String,
    /// Number of archive entries.
    pub entry_count: usize,
    /// Whether the attestation was signed.
    pub signed: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Sealing failures.
#[derive(Debug, Error)]
pub enum SealError {
    /// Signing is enabled but no key pair was supplied.
    #[error("signing enabled but no signing key is available")]
    MissingSigningKey,
    /// CAS read failure.
    #[error(transparent)]
    Cas(#[from] CasError),
    /// Archive write failure.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// Canonicalization failure.
    #[error("hashing error: {0}")]
    Hash(String),
    /// Timestamp rendering failure.
    #[error(transparent)]
    Time(#[from] TimeError),
    /// Provenance or delta log is not JSONL.
    #[error("invalid {entry}: {error}")]
    InvalidLog {
        /// Entry name.
        entry: &'static str,
        /// Underlying error.
        error: DeltaError,
    },
    /// An embedded contract does not validate.
    #[error("invalid contract {0}")]
    InvalidContract(&'static str),
    /// DSSE signing failure.
    #[error("dsse signing failed: {0}")]
    Dsse(#[from] DsseError),
}

impl From<HashError> for SealError {
    fn from(err: HashError) -> Self {
        Self::Hash(err.to_string())
    }
}

// ============================================================================
// SECTION: Sealer
// ============================================================================

/// Bundle sealer bound to a CAS, a signer, and an audit sink.
pub struct BundleSealer<'a> {
    /// Content store supplying blobs.
    cas: &'a ContentStore,
    /// Category switches.
    include: InclusionFlags,
    /// Whether the attestation must be signed.
    signing_enabled: bool,
    /// Producer key pair.
    signer: Option<&'a Ed25519KeyPair>,
    /// Audit sink.
    audit: &'a dyn FieldpackAuditSink,
}

impl<'a> BundleSealer<'a> {
    /// Creates a sealer.
    #[must_use]
    pub fn new(
        cas: &'a ContentStore,
        include: InclusionFlags,
        signing_enabled: bool,
        signer: Option<&'a Ed25519KeyPair>,
        audit: &'a dyn FieldpackAuditSink,
    ) -> Self {
        Self {
            cas,
            include,
            signing_enabled,
            signer,
            audit,
        }
    }

    /// Seals a bundle into `out_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SealError`] when inputs are invalid, key material is missing,
    /// or any read or write fails. Nothing is left under the final name on
    /// failure.
    pub fn seal(&self, request: &SealRequest, out_dir: &Path) -> Result<SealedBundle, SealError> {
        validate_label(&request.label)?;
        let signer = match (self.signing_enabled, self.signer) {
            (true, None) => return Err(SealError::MissingSigningKey),
            (true, Some(signer)) => Some(signer),
            (false, _) => None,
        };
        let assembled = self.assemble(request, signer)?;
        let file_name = bundle_file_name(&request.label, &request.created_utc.to_compact()?);
        let path = write_archive(out_dir, &file_name, &assembled.entries)?;

        self.audit.record_sealed(&BundleSealedEvent::new(BundleSealedEventParams {
            toolchain_id: request.toolchain_id.clone(),
            label: request.label.clone(),
            bundle_path: path.display().to_string(),
            bundle_map_hash: assembled.bundle_map_hash.clone(),
            entry_count: assembled.entries.len(),
            signed: signer.is_some(),
        }));

        Ok(SealedBundle {
            path,
            bundle_map_hash: assembled.bundle_map_hash,
            manifest_hash: assembled.manifest_hash,
            entry_count: assembled.entries.len(),
            signed: signer.is_some(),
        })
    }

    /// Builds every archive entry in memory.
    fn assemble(
        &self,
        request: &SealRequest,
        signer: Option<&Ed25519KeyPair>,
    ) -> Result<AssembledBundle, SealError> {
        let created_utc = request.created_utc.to_rfc3339()?;
        let mut content: BTreeMap<String, Vec<u8>> = BTreeMap::new();

        for kind in CasKind::ALL {
            if !self.include.includes(kind) {
                continue;
            }
            for digest in self.cas.list(kind)? {
                let bytes = self.cas.get(&digest, kind)?;
                content.insert(kind.entry_name(&digest), bytes);
            }
        }

        let mut provenance_hash = None;
        if self.include.provenance {
            let text = match &request.provenance_jsonl {
                Some(text) => canonical_jsonl(text).map_err(|error| SealError::InvalidLog {
                    entry: PROVENANCE_ENTRY,
                    error,
                })?,
                None => seal_provenance(request, &created_utc)?,
            };
            provenance_hash = Some(sha256_hex(text.as_bytes()));
            content.insert(PROVENANCE_ENTRY.to_string(), text.into_bytes());
        }

        let mut kg_delta_hash = None;
        if self.include.kg_delta {
            let text = canonical_jsonl(request.kg_delta_jsonl.as_deref().unwrap_or_default())
                .map_err(|error| SealError::InvalidLog {
                    entry: KG_DELTA_ENTRY,
                    error,
                })?;
            kg_delta_hash = Some(sha256_hex(text.as_bytes()));
            content.insert(KG_DELTA_ENTRY.to_string(), text.into_bytes());
        }

        let mut sbom_hash = None;
        let mut sbom_spec_version = String::new();
        if self.include.sbom {
            let bom = build_cyclonedx_bom(&created_utc);
            let bytes = canonical_json_line(&bom)?;
            sbom_hash = Some(sha256_hex(&bytes));
            sbom_spec_version.clone_from(&bom.spec_version);
            content.insert(SBOM_ENTRY.to_string(), bytes);
        }

        for (kind, bytes) in &request.contracts {
            if !validate_contract(*kind, bytes).ok {
                return Err(SealError::InvalidContract(kind.entry_name()));
            }
            content.insert(kind.entry_name().to_string(), bytes.clone());
        }

        let files: BTreeMap<String, String> =
            content.iter().map(|(name, bytes)| (name.clone(), sha256_hex(bytes))).collect();
        let map_hash = bundle_map_hash(&files)?;

        let manifest = Manifest {
            manifest_version: MANIFEST_VERSION.to_string(),
            toolchain_id: request.toolchain_id.clone(),
            created_utc: created_utc.clone(),
            files,
            bundle_map_hash: map_hash.clone(),
            policy_hash: request.policy_hash.clone(),
            allowlist_hash: request.allowlist_hash.clone(),
            sbom_hash: sbom_hash.clone(),
            provenance_hash: provenance_hash.clone(),
            kg_delta_hash: kg_delta_hash.clone(),
        };
        let manifest_bytes = canonical_json_line(&manifest)?;
        let manifest_hash = sha256_hex(&manifest_bytes);

        let attestation = Attestation {
            attestation_version: ATTESTATION_VERSION.to_string(),
            toolchain_id: request.toolchain_id.clone(),
            label: request.label.clone(),
            bundle_map_hash: map_hash.clone(),
            manifest_hash: manifest_hash.clone(),
            policy_hash: request.policy_hash.clone(),
            allowlist_hash: request.allowlist_hash.clone(),
            sbom_hash: sbom_hash.clone(),
            provenance_hash: provenance_hash.clone(),
            kg_delta_hash: kg_delta_hash.clone(),
            created_utc: created_utc.clone(),
            algo: SIGNATURE_ALGORITHM.to_string(),
            signing_schema: Some(SIGNING_SCHEMA.to_string()),
        };
        let attestation_bytes = canonical_json_line(&attestation)?;

        let mut entries = content;
        entries.insert(MANIFEST_ENTRY.to_string(), manifest_bytes);

        if let Some(signer) = signer {
            let signature = signer.sign(&attestation_bytes);
            entries.insert(
                SIGNATURE_ENTRY.to_string(),
                format!("{}\n", BASE64.encode(signature)).into_bytes(),
            );

            if let Some(sbom_hash) = &sbom_hash {
                let statement = Statement::new(
                    vec![Subject::sha256(SBOM_ENTRY, sbom_hash)],
                    SBOM_PREDICATE_TYPE,
                    json!({
                        "toolchain_id": request.toolchain_id,
                        "created_utc": created_utc,
                        "sbom_format": CYCLONEDX_FORMAT,
                        "sbom_spec_version": sbom_spec_version,
                    }),
                );
                let envelope = sign_statement(&statement, signer)?;
                entries.insert(SBOM_DSSE_ENTRY.to_string(), canonical_json_line(&envelope)?);
            }

            let statement = Statement::new(
                vec![Subject::sha256(MANIFEST_ENTRY, &manifest_hash)],
                BUILD_PREDICATE_TYPE,
                json!({
                    "toolchain_id": request.toolchain_id,
                    "label": request.label,
                    "created_utc": created_utc,
                    "bundle_map_hash": map_hash,
                    "policy_hash": request.policy_hash,
                    "allowlist_hash": request.allowlist_hash,
                    "sbom_sha256": sbom_hash,
                    "provenance_sha256": provenance_hash,
                    "kg_delta_sha256": kg_delta_hash,
                }),
            );
            let envelope = sign_statement(&statement, signer)?;
            entries.insert(ATTESTATION_DSSE_ENTRY.to_string(), canonical_json_line(&envelope)?);
        }
        entries.insert(ATTESTATION_ENTRY.to_string(), attestation_bytes);

        Ok(AssembledBundle {
            entries,
            bundle_map_hash: map_hash,
            manifest_hash,
        })
    }
}

/// In-memory bundle ready to be written.
struct AssembledBundle {
    /// Every archive entry by name.
    entries: BTreeMap<String, Vec<u8>>,
    /// Hash of the manifest file map.
    bundle_map_hash: String,
    /// SHA-256 of the manifest entry bytes.
    manifest_hash: String,
}

/// Default provenance log recording the seal itself.
fn seal_provenance(request: &SealRequest, created_utc: &str) -> Result<String, SealError> {
    let mut log = ProvenanceLog::new();
    log.append(
        "bundle_sealed",
        json!({
            "toolchain_id": request.toolchain_id,
            "label": request.label,
            "created_utc": created_utc,
        }),
    )?;
    Ok(log.to_jsonl()?)
}
