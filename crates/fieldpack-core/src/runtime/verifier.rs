// crates/fieldpack-core/src/runtime/verifier.rs
// ============================================================================
// Module: Fieldpack Bundle Verifier
// Description: Fail-closed, ordered verification of sealed bundles.
// Purpose: Decide whether a bundle is intact, attributable, and policy-compliant.
// Dependencies: crate::{core, runtime::archive, audit}, base64, serde_json
// ============================================================================

//! ## Overview
//! Verification runs a fixed sequence of gates and stops at the first
//! failure. Every expected failure is reported as data through
//! [`VerifyResult`] with a stable machine-readable reason; [`VerifyError`] is
//! reserved for environment faults such as an unreadable trust-root key.
//!
//! Gate order: existence, member safety, size limits, protected paths,
//! mandatory entries, manifest structure, entry digests, map hash,
//! attestation bindings, governance drift, allowlist, signature, DSSE
//! envelopes, provenance chain, MEAP semantics, interface contracts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashSet;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::audit::BundleVerifiedEvent;
use crate::audit::BundleVerifiedEventParams;
use crate::audit::FieldpackAuditSink;
use crate::audit::NoopAuditSink;
use crate::core::allowlist::Allowlist;
use crate::core::artifact::ArtifactKind;
use crate::core::artifact::classify;
use crate::core::contracts::ContractIssue;
use crate::core::contracts::ContractKind;
use crate::core::contracts::ContractsReport;
use crate::core::contracts::validate_contract;
use crate::core::dsse::verify_envelope_bytes;
use crate::core::hashing::sha256_hex;
use crate::core::keys::KeyError;
use crate::core::keys::PublicKey;
use crate::core::manifest::ATTESTATION_DSSE_ENTRY;
use crate::core::manifest::ATTESTATION_ENTRY;
use crate::core::manifest::ATTESTATION_VERSION;
use crate::core::manifest::MANIFEST_ENTRY;
use crate::core::manifest::META_ENTRY_NAMES;
use crate::core::manifest::PROVENANCE_ENTRY;
use crate::core::manifest::SBOM_DSSE_ENTRY;
use crate::core::manifest::SBOM_ENTRY;
use crate::core::manifest::SIGNATURE_ENTRY;
use crate::core::manifest::bundle_map_hash;
use crate::core::manifest::legacy_signing_message;
use crate::core::policy::MeapPolicy;
use crate::core::policy::PolicyError;
use crate::core::provenance::verify_chain;
use crate::runtime::archive::ArchiveError;
use crate::runtime::archive::is_safe_member_name;
use crate::runtime::archive::list_members_from;
use crate::runtime::archive::read_bundle_bytes;
use crate::runtime::archive::read_members_from;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Bytes per MiB for the size gate.
const BYTES_PER_MB: u64 = 1024 * 1024;
/// Tar block size; each member costs one header block plus up to one block of padding.
const TAR_BLOCK: u64 = 512;
/// End-of-archive marker plus record padding.
const ARCHIVE_TRAILER: u64 = 20 * TAR_BLOCK;

// ============================================================================
// SECTION: Results
// ============================================================================

/// One MEAP policy finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeapFinding {
    /// Finding code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Severity label.
    pub severity: String,
    /// Offending entry name.
    pub subject: Option<String>,
}

/// MEAP semantic evaluation over manifest entry names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeapEvaluation {
    /// True when no error findings were raised.
    pub ok: bool,
    /// Findings in evaluation order.
    pub findings: Vec<MeapFinding>,
    /// Artifact kinds observed, sorted by label.
    pub artifact_types_seen: Vec<ArtifactKind>,
}

/// Verification outcome; `reason` is `ok` on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    /// Overall outcome.
    pub ok: bool,
    /// Machine-readable reason.
    pub reason: String,
    /// Claimed producer identity.
    pub toolchain_id: Option<String>,
    /// Recomputed file map hash.
    pub bundle_map_hash: Option<String>,
    /// Local policy hash.
    pub policy_hash_expected: Option<String>,
    /// Attested policy hash.
    pub policy_hash_seen: Option<String>,
    /// Local allowlist hash.
    pub allowlist_hash_expected: Option<String>,
    /// Attested allowlist hash.
    pub allowlist_hash_seen: Option<String>,
    /// MEAP findings on `meap_eval_failed`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meap_findings: Vec<MeapFinding>,
    /// Artifact kinds on `meap_eval_failed`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_types_seen: Vec<ArtifactKind>,
    /// Issues on `invalid_studspec`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub studspec_issues: Vec<ContractIssue>,
    /// Issues on `invalid_tubespec`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tubespec_issues: Vec<ContractIssue>,
}

/// A verdict and the archive bytes it was computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBundle {
    /// Verification outcome.
    pub result: VerifyResult,
    /// Archive bytes; empty when the file was never read.
    pub bytes: Vec<u8>,
}

/// Environment faults that prevent a verdict.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Bundle file exists but cannot be read.
    #[error("bundle io error: {0}")]
    Io(String),
    /// Trust-root key file is unreadable or malformed.
    #[error(transparent)]
    TrustRoot(#[from] KeyError),
    /// Local governance documents cannot be hashed.
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Bundle verifier bound to local governance inputs.
pub struct BundleVerifier<'a> {
    /// Local policy.
    policy: &'a MeapPolicy,
    /// Local allowlist.
    allowlist: &'a Allowlist,
    /// Audit sink.
    audit: &'a dyn FieldpackAuditSink,
}

impl<'a> BundleVerifier<'a> {
    /// Creates a verifier.
    #[must_use]
    pub fn new(
        policy: &'a MeapPolicy,
        allowlist: &'a Allowlist,
        audit: &'a dyn FieldpackAuditSink,
    ) -> Self {
        Self {
            policy,
            allowlist,
            audit,
        }
    }

    /// Verifies the bundle at `path` and records an audit event.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError`] only for environment faults.
    pub fn verify(&self, path: &Path) -> Result<VerifyResult, VerifyError> {
        self.verify_retaining(path).map(|verified| verified.result)
    }

    /// Reads the bundle at `path` once, verifies that buffer, and returns the
    /// verdict together with the exact bytes it covers.
    ///
    /// Callers that act on bundle contents must use the returned bytes; the
    /// file may change after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError`] only for environment faults.
    pub fn verify_retaining(&self, path: &Path) -> Result<VerifiedBundle, VerifyError> {
        let bundle_path = path.display().to_string();
        if !path.is_file() {
            let result = Diagnostics::default().fail("missing_bundle");
            self.record(&bundle_path, &result);
            return Ok(VerifiedBundle {
                result,
                bytes: Vec::new(),
            });
        }
        let bytes = match read_bundle_bytes(path, self.byte_limit()) {
            Ok(bytes) => bytes,
            Err(ArchiveError::TooLarge {
                ..
            }) => {
                let result = Diagnostics::default().fail("bundle_too_large");
                self.record(&bundle_path, &result);
                return Ok(VerifiedBundle {
                    result,
                    bytes: Vec::new(),
                });
            }
            Err(err) => return Err(VerifyError::Io(err.to_string())),
        };
        let result = self.verify_bytes(&bundle_path, &bytes)?;
        Ok(VerifiedBundle {
            result,
            bytes,
        })
    }

    /// Verifies an in-memory archive and records an audit event naming
    /// `bundle_path`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError`] only for environment faults.
    pub fn verify_bytes(&self, bundle_path: &str, bytes: &[u8]) -> Result<VerifyResult, VerifyError> {
        let result = self.run_gates(bytes)?;
        self.record(bundle_path, &result);
        Ok(result)
    }

    /// Largest archive file the verifier reads: the member size cap plus
    /// tar header and padding overhead for the member count cap.
    #[must_use]
    pub fn byte_limit(&self) -> u64 {
        let thresholds = &self.policy.thresholds;
        let entries = thresholds.max_files_in_bundle.saturating_add(1);
        thresholds
            .max_bundle_mb
            .saturating_mul(BYTES_PER_MB)
            .saturating_add(entries.saturating_mul(2 * TAR_BLOCK))
            .saturating_add(ARCHIVE_TRAILER)
    }

    /// Records a verification audit event.
    fn record(&self, bundle_path: &str, result: &VerifyResult) {
        self.audit.record_verified(&BundleVerifiedEvent::new(BundleVerifiedEventParams {
            bundle_path: bundle_path.to_string(),
            ok: result.ok,
            reason: result.reason.clone(),
            toolchain_id: result.toolchain_id.clone(),
        }));
    }

    /// Runs every gate in order over an in-memory archive.
    #[allow(clippy::too_many_lines, reason = "Gate order is easier to audit in one sequence.")]
    fn run_gates(&self, bytes: &[u8]) -> Result<VerifyResult, VerifyError> {
        let mut diag = Diagnostics::default();
        let Ok(members) = list_members_from(bytes) else {
            return Ok(diag.fail("corrupt_bundle"));
        };
        let thresholds = &self.policy.thresholds;

        // Member safety.
        let file_names: Vec<&str> =
            members.iter().filter(|m| m.regular).map(|m| m.name.as_str()).collect();
        let unique: HashSet<&str> = file_names.iter().copied().collect();
        if unique.len() != file_names.len() {
            return Ok(diag.fail("duplicate_zip_members"));
        }
        if let Some(member) = members.iter().find(|m| !m.regular || !is_safe_member_name(&m.name)) {
            return Ok(diag.fail(format!("unsafe_zip_member:{}", member.name)));
        }

        // Limits.
        let total_bytes: u64 = members.iter().map(|m| m.size).sum();
        if total_bytes > thresholds.max_bundle_mb.saturating_mul(BYTES_PER_MB) {
            return Ok(diag.fail("bundle_too_large"));
        }
        if members.len() as u64 > thresholds.max_files_in_bundle {
            return Ok(diag.fail("too_many_files"));
        }

        // Protected paths.
        if let Some(protected) = members.iter().find_map(|m| self.policy.protected_match(&m.name)) {
            return Ok(diag.fail(format!("protected_path:{protected}")));
        }

        // Presence.
        let present = unique;
        if !present.contains(MANIFEST_ENTRY) {
            return Ok(diag.fail("missing_manifest"));
        }
        if !present.contains(ATTESTATION_ENTRY) {
            return Ok(diag.fail("missing_attestation"));
        }
        if thresholds.require_signature && !present.contains(SIGNATURE_ENTRY) {
            return Ok(diag.fail("missing_signature"));
        }
        if thresholds.require_cyclonedx_sbom {
            if !present.contains(SBOM_ENTRY) {
                return Ok(diag.fail("missing_cyclonedx_sbom"));
            }
            if !present.contains(SBOM_DSSE_ENTRY) {
                return Ok(diag.fail("missing_cyclonedx_dsse"));
            }
        }
        if thresholds.require_dsse_attestations && !present.contains(ATTESTATION_DSSE_ENTRY) {
            return Ok(diag.fail("missing_dsse_attestation"));
        }

        let Ok(contents) = read_members_from(bytes) else {
            return Ok(diag.fail("corrupt_bundle"));
        };

        // Manifest structure.
        let manifest_bytes = entry(&contents, MANIFEST_ENTRY);
        let Ok(manifest) = serde_json::from_slice::<Value>(manifest_bytes) else {
            return Ok(diag.fail("manifest_parse_error"));
        };
        diag.toolchain_id = manifest.get("toolchain_id").and_then(Value::as_str).map(str::to_string);
        let files = match manifest.get("files") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(object)) => object
                .iter()
                .map(|(name, digest)| (name.clone(), value_text(digest)))
                .collect::<BTreeMap<String, String>>(),
            Some(_) => return Ok(diag.fail("manifest_files_not_dict")),
        };
        if let Some(name) = files.keys().find(|name| !is_safe_member_name(name) || name.ends_with('/')) {
            return Ok(diag.fail(format!("unsafe_manifest_name:{name}")));
        }
        if let Some(name) = file_names
            .iter()
            .find(|name| !files.contains_key(**name) && !META_ENTRY_NAMES.contains(*name))
        {
            return Ok(diag.fail(format!("unexpected_zip_member:{name}")));
        }

        // Entry digests.
        if thresholds.require_manifest_hashes {
            for (name, expected) in &files {
                let Some(bytes) = contents.get(name) else {
                    return Ok(diag.fail(format!("manifest_file_missing:{name}")));
                };
                if sha256_hex(bytes) != *expected {
                    return Ok(diag.fail(format!("hash_mismatch:{name}")));
                }
            }
        }

        let Ok(map_hash) = bundle_map_hash(&files) else {
            return Ok(diag.fail("bundle_map_hash_mismatch"));
        };
        diag.bundle_map_hash = Some(map_hash.clone());
        if thresholds.require_deterministic_bundle_hash
            && manifest.get("bundle_map_hash").map(value_text).unwrap_or_default() != map_hash
        {
            return Ok(diag.fail("bundle_map_hash_mismatch"));
        }

        // Attestation bindings.
        let attestation_bytes = entry(&contents, ATTESTATION_ENTRY);
        let Ok(attestation) = serde_json::from_slice::<Value>(attestation_bytes) else {
            return Ok(diag.fail("attestation_parse_error"));
        };
        let claim = |field: &str| attestation.get(field).map(value_text).unwrap_or_default();
        if thresholds.require_deterministic_bundle_hash && claim("bundle_map_hash") != map_hash {
            return Ok(diag.fail("attestation_bundle_map_hash_mismatch"));
        }
        let manifest_hash = sha256_hex(manifest_bytes);
        if claim("manifest_hash") != manifest_hash {
            return Ok(diag.fail("attestation_manifest_hash_mismatch"));
        }

        // Governance drift.
        diag.policy_hash_expected = Some(self.policy.canonical_hash()?);
        diag.allowlist_hash_expected = Some(self.allowlist.canonical_hash()?);
        diag.policy_hash_seen = non_empty_claim(&attestation, "policy_hash");
        diag.allowlist_hash_seen = non_empty_claim(&attestation, "allowlist_hash");
        if thresholds.require_policy_hash_match
            && diag.policy_hash_seen.is_some()
            && diag.policy_hash_seen != diag.policy_hash_expected
        {
            return Ok(diag.fail("policy_hash_mismatch"));
        }
        if thresholds.require_allowlist_hash_match
            && diag.allowlist_hash_seen.is_some()
            && diag.allowlist_hash_seen != diag.allowlist_hash_expected
        {
            return Ok(diag.fail("allowlist_hash_mismatch"));
        }

        // Trust root.
        let toolchain_id = diag.toolchain_id.clone().unwrap_or_default();
        if self.allowlist.entry(&toolchain_id).is_none() {
            return Ok(diag.fail("toolchain_not_allowed"));
        }
        let needs_key = thresholds.require_signature
            || thresholds.require_dsse_attestations
            || thresholds.require_cyclonedx_sbom;
        let trust_root = if needs_key { self.allowlist.trust_root(&toolchain_id)? } else { None };

        // Signature.
        if thresholds.require_signature {
            let Some(key) = &trust_root else {
                return Ok(diag.fail("toolchain_not_allowed"));
            };
            if !signature_valid(key, entry(&contents, SIGNATURE_ENTRY), attestation_bytes, &claim) {
                return Ok(diag.fail("bad_signature"));
            }
        }

        // DSSE envelopes.
        if let Some(key) = &trust_root {
            if thresholds.require_dsse_attestations {
                match verify_envelope_bytes(entry(&contents, ATTESTATION_DSSE_ENTRY), key) {
                    Err(err) => return Ok(diag.fail(format!("dsse_attestation_invalid:{err}"))),
                    Ok(statement) if !statement.binds(MANIFEST_ENTRY, &manifest_hash) => {
                        return Ok(diag.fail("dsse_manifest_digest_mismatch"));
                    }
                    Ok(_) => {}
                }
            }
            if thresholds.require_cyclonedx_sbom {
                let sbom_digest = sha256_hex(entry(&contents, SBOM_ENTRY));
                match verify_envelope_bytes(entry(&contents, SBOM_DSSE_ENTRY), key) {
                    Err(err) => return Ok(diag.fail(format!("dsse_sbom_invalid:{err}"))),
                    Ok(statement) if !statement.binds(SBOM_ENTRY, &sbom_digest) => {
                        return Ok(diag.fail("dsse_sbom_digest_mismatch"));
                    }
                    Ok(_) => {}
                }
            }
        }

        // Provenance chain.
        if thresholds.require_provenance_chain_intact {
            let intact = contents
                .get(PROVENANCE_ENTRY)
                .and_then(|bytes| std::str::from_utf8(bytes).ok())
                .is_some_and(|text| verify_chain(text).is_ok());
            if !intact {
                return Ok(diag.fail("provenance_chain_broken"));
            }
        }

        // MEAP semantics.
        let evaluation = evaluate_meap(self.policy, files.keys().map(String::as_str));
        if !evaluation.ok {
            let mut result = diag.fail("meap_eval_failed");
            result.meap_findings = evaluation.findings;
            result.artifact_types_seen = evaluation.artifact_types_seen;
            return Ok(result);
        }

        // Interface contracts.
        for kind in ContractKind::ALL {
            if let Some(bytes) = contents.get(kind.entry_name()) {
                let report = validate_contract(kind, bytes);
                if !report.ok {
                    let mut result = diag.fail(kind.failure_reason());
                    match kind {
                        ContractKind::Studspec => result.studspec_issues = report.issues,
                        ContractKind::Tubespec => result.tubespec_issues = report.issues,
                    }
                    return Ok(result);
                }
            }
        }

        let mut result = diag.fail("ok");
        result.ok = true;
        Ok(result)
    }
}

/// Verifies a bundle without audit output.
///
/// # Errors
///
/// Returns [`VerifyError`] only for environment faults.
pub fn verify_bundle(
    path: &Path,
    policy: &MeapPolicy,
    allowlist: &Allowlist,
) -> Result<VerifyResult, VerifyError> {
    BundleVerifier::new(policy, allowlist, &NoopAuditSink).verify(path)
}

// ============================================================================
// SECTION: MEAP Evaluation
// ============================================================================

/// Evaluates the kill switch and artifact-type allow-list over entry names.
#[must_use]
pub fn evaluate_meap<'n>(
    policy: &MeapPolicy,
    names: impl IntoIterator<Item = &'n str>,
) -> MeapEvaluation {
    let mut findings = Vec::new();
    if policy.kill_switch.enabled {
        findings.push(MeapFinding {
            code: "kill_switch_enabled".to_string(),
            message: "MEAP kill switch is enabled; refusing bundle".to_string(),
            severity: "error".to_string(),
            subject: None,
        });
    }
    let allowed = &policy.accept.allowed_artifact_types;
    let mut seen = BTreeSet::new();
    for name in names {
        let kind = classify(name);
        seen.insert(kind);
        if !allowed.is_empty() && !allowed.contains(&kind) {
            findings.push(MeapFinding {
                code: "artifact_type_denied".to_string(),
                message: format!("artifact type '{}' is not in policy allow-list", kind.as_str()),
                severity: "error".to_string(),
                subject: Some(name.to_string()),
            });
        }
    }
    let mut artifact_types_seen: Vec<ArtifactKind> = seen.into_iter().collect();
    artifact_types_seen.sort_by_key(|kind| kind.as_str());
    MeapEvaluation {
        ok: !findings.iter().any(|finding| finding.severity == "error"),
        findings,
        artifact_types_seen,
    }
}

// ============================================================================
// SECTION: Contract Reports
// ============================================================================

/// Validates every contract entry present in `members`.
#[must_use]
pub fn contracts_report(members: &BTreeMap<String, Vec<u8>>) -> ContractsReport {
    let mut report = ContractsReport::default();
    for kind in ContractKind::ALL {
        if let Some(bytes) = members.get(kind.entry_name()) {
            report.set(kind, validate_contract(kind, bytes));
        }
    }
    report
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Diagnostic fields accumulated while gates run.
#[derive(Debug, Default)]
struct Diagnostics {
    /// Claimed producer identity.
    toolchain_id: Option<String>,
    /// Recomputed file map hash.
    bundle_map_hash: Option<String>,
    /// Local policy hash.
    policy_hash_expected: Option<String>,
    /// Attested policy hash.
    policy_hash_seen: Option<String>,
    /// Local allowlist hash.
    allowlist_hash_expected: Option<String>,
    /// Attested allowlist hash.
    allowlist_hash_seen: Option<String>,
}

impl Diagnostics {
    /// Builds a failed result carrying the diagnostics gathered so far.
    fn fail(&self, reason: impl Into<String>) -> VerifyResult {
        VerifyResult {
            ok: false,
            reason: reason.into(),
            toolchain_id: self.toolchain_id.clone(),
            bundle_map_hash: self.bundle_map_hash.clone(),
            policy_hash_expected: self.policy_hash_expected.clone(),
            policy_hash_seen: self.policy_hash_seen.clone(),
            allowlist_hash_expected: self.allowlist_hash_expected.clone(),
            allowlist_hash_seen: self.allowlist_hash_seen.clone(),
            ..VerifyResult::default()
        }
    }
}

/// String form of a JSON value; strings unquoted, null empty.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Attestation claim that is present and non-empty.
fn non_empty_claim(attestation: &Value, field: &str) -> Option<String> {
    attestation.get(field).map(value_text).filter(|text| !text.is_empty())
}

/// Checks the detached signature under the scheme the attestation declares.
fn signature_valid(
    key: &PublicKey,
    signature_entry: &[u8],
    attestation_bytes: &[u8],
    claim: &dyn Fn(&str) -> String,
) -> bool {
    let text = String::from_utf8_lossy(signature_entry);
    let Ok(signature) = BASE64.decode(text.trim().as_bytes()) else {
        return false;
    };
    let version = claim("attestation_version");
    if version == ATTESTATION_VERSION {
        key.verify(attestation_bytes, &signature)
    } else {
        let message = legacy_signing_message(
            &claim("bundle_map_hash"),
            &claim("sbom_hash"),
            &claim("provenance_hash"),
        );
        key.verify(&message, &signature)
    }
}

/// Entry bytes by name; empty when absent.
fn entry<'c>(contents: &'c BTreeMap<String, Vec<u8>>, name: &str) -> &'c [u8] {
    contents.get(name).map(Vec::as_slice).unwrap_or_default()
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
    use crate::core::policy::KillSwitch;

    #[test]
    fn meap_reports_denied_kinds_and_kill_switch() {
        let mut policy = MeapPolicy::default();
        policy.accept.allowed_artifact_types = vec![ArtifactKind::KgDelta, ArtifactKind::Sbom];
        policy.kill_switch = KillSwitch {
            enabled: true,
        };
        let evaluation = evaluate_meap(&policy, ["kg_delta.jsonl", "sbom/bom.cdx.json", "model.onnx"]);
        assert!(!evaluation.ok);
        let codes: Vec<&str> = evaluation.findings.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, vec!["kill_switch_enabled", "artifact_type_denied"]);
        assert_eq!(evaluation.findings[1].subject.as_deref(), Some("model.onnx"));
        assert_eq!(
            evaluation.artifact_types_seen,
            vec![ArtifactKind::KgDelta, ArtifactKind::Onnx, ArtifactKind::Sbom]
        );
    }

    #[test]
    fn empty_allow_list_permits_every_kind() {
        let evaluation = evaluate_meap(&MeapPolicy::default(), ["a.py", "b.bin"]);
        assert!(evaluation.ok);
        assert!(evaluation.findings.is_empty());
    }

    #[test]
    fn missing_bundle_is_reported_as_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = verify_bundle(
            &dir.path().join("absent.tar"),
            &MeapPolicy::default(),
            &Allowlist::default(),
        )
        .unwrap();
        assert!(!result.ok);
        assert_eq!(result.reason, "missing_bundle");
    }
}
