// crates/fieldpack-core/tests/sealer_verifier.rs
// ============================================================================
// Module: Sealer and Verifier Tests
// Description: Deterministic sealing and fail-closed verification gates.
// ============================================================================
//! ## Overview
//! Seals bundles from a temporary CAS, then tampers with them entry by entry
//! to confirm each verifier gate reports its specific reason.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use fieldpack_core::Allowlist;
use fieldpack_core::ArtifactKind;
use fieldpack_core::BundleSealer;
use fieldpack_core::BundleVerifier;
use fieldpack_core::CasKind;
use fieldpack_core::ContentStore;
use fieldpack_core::ContractKind;
use fieldpack_core::Ed25519KeyPair;
use fieldpack_core::InclusionFlags;
use fieldpack_core::MeapPolicy;
use fieldpack_core::NoopAuditSink;
use fieldpack_core::SealError;
use fieldpack_core::SealRequest;
use fieldpack_core::ToolchainEntry;
use fieldpack_core::UtcTimestamp;
use fieldpack_core::VerifyResult;
use fieldpack_core::core::manifest::ATTESTATION_DSSE_ENTRY;
use fieldpack_core::core::manifest::ATTESTATION_ENTRY;
use fieldpack_core::core::manifest::KG_DELTA_ENTRY;
use fieldpack_core::core::manifest::MANIFEST_ENTRY;
use fieldpack_core::core::manifest::SBOM_DSSE_ENTRY;
use fieldpack_core::core::manifest::SIGNATURE_ENTRY;
use fieldpack_core::core::manifest::legacy_signing_message;
use fieldpack_core::core::policy::KillSwitch;
use fieldpack_core::runtime::archive::read_members;
use fieldpack_core::runtime::archive::write_archive;
use fieldpack_core::verify_bundle;
use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Two nodes and one edge.
const DELTA: &str = concat!(
    "{\"op\":\"ADD_NODE\",\"id\":\"n1\",\"type\":\"Doc\",\"attrs\":{\"title\":\"alpha\"}}\n",
    "{\"op\":\"ADD_NODE\",\"id\":\"n2\",\"type\":\"Doc\"}\n",
    "{\"op\":\"ADD_EDGE\",\"src\":\"n1\",\"dst\":\"n2\",\"type\":\"CITES\"}\n",
);

const TOOLCHAIN: &str = "fieldpack-node-a";

struct Fixture {
    dir: TempDir,
    cas: ContentStore,
    key: Ed25519KeyPair,
    allowlist: Allowlist,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let cas = ContentStore::new(dir.path().join("cas"));
    cas.init().unwrap();
    cas.put(b"raw field notes", CasKind::Raw).unwrap();
    cas.put(b"extracted text", CasKind::Extract).unwrap();
    cas.put(b"aux transcript", CasKind::Aux).unwrap();

    let key = Ed25519KeyPair::from_seed(&[7u8; 32]);
    std::fs::write(dir.path().join("producer.pub"), format!("{}\n", key.public_key().to_base64()))
        .unwrap();
    let allowlist = Allowlist::new(
        vec![ToolchainEntry {
            id: TOOLCHAIN.to_string(),
            pubkey_path: "producer.pub".to_string(),
        }],
        dir.path(),
    );
    Fixture {
        dir,
        cas,
        key,
        allowlist,
    }
}

fn request(policy_hash: Option<String>) -> SealRequest {
    SealRequest {
        toolchain_id: TOOLCHAIN.to_string(),
        label: "nightly".to_string(),
        created_utc: UtcTimestamp::from_unix_seconds(1_700_000_000),
        policy_hash,
        allowlist_hash: None,
        provenance_jsonl: None,
        kg_delta_jsonl: Some(DELTA.to_string()),
        contracts: Vec::new(),
    }
}

fn strict_policy() -> MeapPolicy {
    let mut policy = MeapPolicy::default();
    policy.thresholds.require_dsse_attestations = true;
    policy.thresholds.require_cyclonedx_sbom = true;
    policy.thresholds.require_provenance_chain_intact = true;
    policy
}

fn seal_into(fx: &Fixture, request: &SealRequest, out: &str) -> PathBuf {
    let sealer =
        BundleSealer::new(&fx.cas, InclusionFlags::default(), true, Some(&fx.key), &NoopAuditSink);
    sealer.seal(request, &fx.dir.path().join(out)).unwrap().path
}

fn verify(fx: &Fixture, path: &Path, policy: &MeapPolicy) -> VerifyResult {
    verify_bundle(path, policy, &fx.allowlist).unwrap()
}

/// Rewrites a bundle after applying `edit` to its entries.
fn rewrite(
    fx: &Fixture,
    path: &Path,
    out: &str,
    edit: impl FnOnce(&mut BTreeMap<String, Vec<u8>>),
) -> PathBuf {
    let mut entries = read_members(path).unwrap();
    edit(&mut entries);
    write_archive(&fx.dir.path().join(out), "tampered.tar", &entries).unwrap()
}

// ============================================================================
// SECTION: Sealing
// ============================================================================

#[test]
fn sealed_bundle_verifies_under_strict_policy() {
    let fx = fixture();
    let path = seal_into(&fx, &request(None), "out");
    let result = verify(&fx, &path, &strict_policy());
    assert!(result.ok, "{result:?}");
    assert_eq!(result.reason, "ok");
    assert_eq!(result.toolchain_id.as_deref(), Some(TOOLCHAIN));

    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("fieldpack_bundle_nightly_"));
    assert!(name.ends_with(".tar"));

    let entries = read_members(&path).unwrap();
    for digest in fx.cas.list(CasKind::Raw).unwrap() {
        assert!(entries.contains_key(&format!("raw/sha256/{digest}")));
    }
    assert!(entries.contains_key(ATTESTATION_DSSE_ENTRY));
    assert!(entries.contains_key(SBOM_DSSE_ENTRY));
}

#[test]
fn sealing_twice_is_byte_identical() {
    let fx = fixture();
    let first = seal_into(&fx, &request(None), "a");
    let second = seal_into(&fx, &request(None), "b");
    assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
}

#[test]
fn signing_enabled_without_key_is_refused() {
    let fx = fixture();
    let sealer = BundleSealer::new(&fx.cas, InclusionFlags::default(), true, None, &NoopAuditSink);
    let out = fx.dir.path().join("unsigned");
    let err = sealer.seal(&request(None), &out).unwrap_err();
    assert!(matches!(err, SealError::MissingSigningKey));
    assert!(!out.exists());
}

#[test]
fn invalid_contract_is_refused_and_valid_contract_is_embedded() {
    let fx = fixture();
    let mut bad = request(None);
    bad.contracts = vec![(ContractKind::Tubespec, b"{\"tubespec\":\"9\"}".to_vec())];
    let sealer =
        BundleSealer::new(&fx.cas, InclusionFlags::default(), true, Some(&fx.key), &NoopAuditSink);
    assert!(matches!(
        sealer.seal(&bad, &fx.dir.path().join("bad")),
        Err(SealError::InvalidContract("tubespec.json"))
    ));

    let mut good = request(None);
    good.contracts = vec![(
        ContractKind::Tubespec,
        b"{\"tubespec\":\"1.0\",\"runtime\":{\"os\":\"linux\"},\"deps\":[]}".to_vec(),
    )];
    let path = seal_into(&fx, &good, "good");
    assert!(verify(&fx, &path, &MeapPolicy::default()).ok);
    assert!(read_members(&path).unwrap().contains_key("tubespec.json"));
}

#[test]
fn retained_bytes_are_the_verified_bytes() {
    let fx = fixture();
    let path = seal_into(&fx, &request(None), "out");
    let policy = MeapPolicy::default();
    let verifier = BundleVerifier::new(&policy, &fx.allowlist, &NoopAuditSink);

    let retained = verifier.verify_retaining(&path).unwrap();
    assert!(retained.result.ok);
    assert_eq!(retained.bytes, std::fs::read(&path).unwrap());

    let mut flipped = retained.bytes.clone();
    let at = flipped.windows(8).position(|window| window == b"ADD_EDGE").unwrap();
    flipped[at] ^= 0x01;
    let result = verifier.verify_bytes(&path.to_string_lossy(), &flipped).unwrap();
    assert_eq!(result.reason, format!("hash_mismatch:{KG_DELTA_ENTRY}"));

    let missing = verifier.verify_retaining(&fx.dir.path().join("absent.tar")).unwrap();
    assert_eq!(missing.result.reason, "missing_bundle");
    assert!(missing.bytes.is_empty());
}

// ============================================================================
// SECTION: Tamper Detection
// ============================================================================

#[test]
fn flipped_entry_byte_reports_hash_mismatch() {
    let fx = fixture();
    let path = seal_into(&fx, &request(None), "out");
    let tampered = rewrite(&fx, &path, "t", |entries| {
        let delta = entries.get_mut(KG_DELTA_ENTRY).unwrap();
        delta[0] ^= 0x01;
    });
    let result = verify(&fx, &tampered, &MeapPolicy::default());
    assert_eq!(result.reason, format!("hash_mismatch:{KG_DELTA_ENTRY}"));
}

#[test]
fn corrupted_signature_reports_bad_signature() {
    let fx = fixture();
    let path = seal_into(&fx, &request(None), "out");
    let tampered = rewrite(&fx, &path, "t", |entries| {
        let forged = BASE64.encode([0u8; 64]);
        entries.insert(SIGNATURE_ENTRY.to_string(), format!("{forged}\n").into_bytes());
    });
    assert_eq!(verify(&fx, &tampered, &MeapPolicy::default()).reason, "bad_signature");

    let garbage = rewrite(&fx, &path, "g", |entries| {
        entries.insert(SIGNATURE_ENTRY.to_string(), b"not base64!\n".to_vec());
    });
    assert_eq!(verify(&fx, &garbage, &MeapPolicy::default()).reason, "bad_signature");
}

#[test]
fn corrupted_dsse_reports_envelope_reason() {
    let fx = fixture();
    let path = seal_into(&fx, &request(None), "out");
    let tampered = rewrite(&fx, &path, "t", |entries| {
        entries.insert(ATTESTATION_DSSE_ENTRY.to_string(), b"{broken".to_vec());
    });
    let result = verify(&fx, &tampered, &strict_policy());
    assert_eq!(result.reason, "dsse_attestation_invalid:dsse_not_dict");

    let other_key = Ed25519KeyPair::from_seed(&[9u8; 32]);
    let rekeyed = rewrite(&fx, &path, "k", |entries| {
        let mut envelope: Value =
            serde_json::from_slice(&entries[ATTESTATION_DSSE_ENTRY]).unwrap();
        envelope["signatures"][0]["keyid"] = Value::String(other_key.key_id());
        entries.insert(ATTESTATION_DSSE_ENTRY.to_string(), serde_json::to_vec(&envelope).unwrap());
    });
    let result = verify(&fx, &rekeyed, &strict_policy());
    assert_eq!(result.reason, "dsse_attestation_invalid:dsse_keyid_mismatch");
}

#[test]
fn unexpected_member_is_rejected() {
    let fx = fixture();
    let path = seal_into(&fx, &request(None), "out");
    let tampered = rewrite(&fx, &path, "t", |entries| {
        entries.insert("extra/payload.sh".to_string(), b"echo hi".to_vec());
    });
    let result = verify(&fx, &tampered, &MeapPolicy::default());
    assert_eq!(result.reason, "unexpected_zip_member:extra/payload.sh");
}

#[test]
fn traversal_member_is_rejected_before_anything_else() {
    let fx = fixture();
    let path = fx.dir.path().join("evil.tar");
    let file = std::fs::File::create(&path).unwrap();
    let mut builder = tar::Builder::new(file);
    let mut header = tar::Header::new_gnu();
    let name = b"../escape.txt";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(2);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, &b"hi"[..]).unwrap();
    builder.finish().unwrap();
    drop(builder);

    let result = verify(&fx, &path, &MeapPolicy::default());
    assert_eq!(result.reason, "unsafe_zip_member:../escape.txt");
}

#[test]
fn missing_manifest_and_protected_paths_are_reported() {
    let fx = fixture();
    let path = seal_into(&fx, &request(None), "out");
    let no_manifest = rewrite(&fx, &path, "m", |entries| {
        entries.remove(MANIFEST_ENTRY);
    });
    assert_eq!(verify(&fx, &no_manifest, &MeapPolicy::default()).reason, "missing_manifest");

    let mut policy = MeapPolicy::default();
    policy.protected_paths = vec!["raw/".to_string()];
    assert_eq!(verify(&fx, &path, &policy).reason, "protected_path:raw/");
}

#[test]
fn size_and_count_limits_apply() {
    let fx = fixture();
    let path = seal_into(&fx, &request(None), "out");
    let mut policy = MeapPolicy::default();
    policy.thresholds.max_files_in_bundle = 2;
    assert_eq!(verify(&fx, &path, &policy).reason, "too_many_files");
    policy.thresholds.max_bundle_mb = 0;
    assert_eq!(verify(&fx, &path, &policy).reason, "bundle_too_large");
}

#[test]
fn governance_drift_and_unknown_toolchain_are_reported() {
    let fx = fixture();
    let producer_policy = MeapPolicy::default();
    let path =
        seal_into(&fx, &request(Some(producer_policy.canonical_hash().unwrap())), "out");

    let mut consumer_policy = MeapPolicy::default();
    consumer_policy.thresholds.require_policy_hash_match = true;
    consumer_policy.protected_paths = vec!["secrets".to_string()];
    let result = verify(&fx, &path, &consumer_policy);
    assert_eq!(result.reason, "policy_hash_mismatch");
    assert_eq!(result.policy_hash_seen, Some(producer_policy.canonical_hash().unwrap()));

    let empty = Allowlist::default();
    let result = verify_bundle(&path, &MeapPolicy::default(), &empty).unwrap();
    assert_eq!(result.reason, "toolchain_not_allowed");
}

#[test]
fn kill_switch_and_artifact_allow_list_fail_meap() {
    let fx = fixture();
    let path = seal_into(&fx, &request(None), "out");
    let mut policy = MeapPolicy::default();
    policy.kill_switch = KillSwitch {
        enabled: true,
    };
    let result = verify(&fx, &path, &policy);
    assert_eq!(result.reason, "meap_eval_failed");
    assert_eq!(result.meap_findings[0].code, "kill_switch_enabled");

    let mut policy = MeapPolicy::default();
    policy.accept.allowed_artifact_types = vec![ArtifactKind::KgDelta];
    let result = verify(&fx, &path, &policy);
    assert_eq!(result.reason, "meap_eval_failed");
    assert!(result.meap_findings.iter().all(|f| f.code == "artifact_type_denied"));
    assert!(result.artifact_types_seen.contains(&ArtifactKind::Blob));
}

#[test]
fn broken_provenance_chain_is_reported() {
    let fx = fixture();
    let mut req = request(None);
    req.provenance_jsonl = Some(
        "{\"event_type\":\"x\",\"payload\":{},\"prev_hash\":null,\"event_hash\":\"00\"}\n"
            .to_string(),
    );
    let path = seal_into(&fx, &req, "out");
    let result = verify(&fx, &path, &strict_policy());
    assert_eq!(result.reason, "provenance_chain_broken");
}

#[test]
fn legacy_attestation_signature_is_still_accepted() {
    let fx = fixture();
    let path = seal_into(&fx, &request(None), "out");
    let key = Ed25519KeyPair::from_seed(&[7u8; 32]);
    let legacy = rewrite(&fx, &path, "legacy", |entries| {
        let mut attestation: Value =
            serde_json::from_slice(&entries[ATTESTATION_ENTRY]).unwrap();
        attestation["attestation_version"] = Value::String("1".to_string());
        let text = |field: &str| attestation[field].as_str().unwrap_or_default().to_string();
        let message = legacy_signing_message(
            &text("bundle_map_hash"),
            &text("sbom_hash"),
            &text("provenance_hash"),
        );
        let signature = BASE64.encode(key.sign(&message));
        entries.insert(ATTESTATION_ENTRY.to_string(), serde_json::to_vec(&attestation).unwrap());
        entries.insert(SIGNATURE_ENTRY.to_string(), format!("{signature}\n").into_bytes());
    });
    let result = verify(&fx, &legacy, &MeapPolicy::default());
    assert!(result.ok, "{result:?}");
}
