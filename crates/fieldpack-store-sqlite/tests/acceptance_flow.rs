// crates/fieldpack-store-sqlite/tests/acceptance_flow.rs
// ============================================================================
// Module: Acceptance Flow Tests
// Description: Seal, accept, review, and replay against a real SQLite store.
// ============================================================================
//! ## Overview
//! Drives the acceptance engine end to end: sealed bundles are merged or
//! staged according to the effective mode, reviewers decide staged rows
//! exactly once, and replay proves the graph is the fold of its ledger.

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
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use fieldpack_core::Allowlist;
use fieldpack_core::BundleSealer;
use fieldpack_core::CasKind;
use fieldpack_core::ContentStore;
use fieldpack_core::Ed25519KeyPair;
use fieldpack_core::FieldpackAuditSink;
use fieldpack_core::FixedClock;
use fieldpack_core::InclusionFlags;
use fieldpack_core::MeapPolicy;
use fieldpack_core::NoopAuditSink;
use fieldpack_core::PolicyMode;
use fieldpack_core::SealRequest;
use fieldpack_core::ToolchainEntry;
use fieldpack_core::UtcTimestamp;
use fieldpack_core::audit::BundleSealedEvent;
use fieldpack_core::audit::BundleVerifiedEvent;
use fieldpack_core::runtime::archive::write_archive;
use fieldpack_core::sha256_hex;
use fieldpack_store_sqlite::AcceptError;
use fieldpack_store_sqlite::AcceptLimits;
use fieldpack_store_sqlite::AcceptRequest;
use fieldpack_store_sqlite::AcceptStatus;
use fieldpack_store_sqlite::AcceptanceEngine;
use fieldpack_store_sqlite::DEFAULT_GRAPH_LEDGER_FILE;
use fieldpack_store_sqlite::FieldpackStore;
use fieldpack_store_sqlite::LedgerCounts;
use fieldpack_store_sqlite::SqliteStoreConfig;
use fieldpack_store_sqlite::SqliteStoreError;
use fieldpack_store_sqlite::StagedStatus;
use fieldpack_store_sqlite::replay_verify;
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

/// An edge whose destination never exists.
const DANGLING: &str = concat!(
    "{\"op\":\"ADD_NODE\",\"id\":\"n1\",\"type\":\"Doc\"}\n",
    "{\"op\":\"ADD_EDGE\",\"src\":\"n1\",\"dst\":\"ghost\",\"type\":\"CITES\"}\n",
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

impl Fixture {
    fn seal(&self, label: &str, delta: &str) -> PathBuf {
        let request = SealRequest {
            toolchain_id: TOOLCHAIN.to_string(),
            label: label.to_string(),
            created_utc: UtcTimestamp::from_unix_seconds(1_700_000_000),
            policy_hash: None,
            allowlist_hash: None,
            provenance_jsonl: None,
            kg_delta_jsonl: Some(delta.to_string()),
            contracts: Vec::new(),
        };
        let sealer = BundleSealer::new(
            &self.cas,
            InclusionFlags::default(),
            true,
            Some(&self.key),
            &NoopAuditSink,
        );
        sealer.seal(&request, &self.dir.path().join("outbox")).unwrap().path
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.path().join(DEFAULT_GRAPH_LEDGER_FILE)
    }

    fn engine(&self, mode: PolicyMode) -> AcceptanceEngine {
        let store =
            FieldpackStore::open(SqliteStoreConfig::new(self.dir.path().join("fieldpack.sqlite")))
                .unwrap();
        let policy = MeapPolicy {
            mode,
            ..MeapPolicy::default()
        };
        AcceptanceEngine::new(store, policy, self.allowlist.clone())
            .with_clock(Arc::new(FixedClock(UtcTimestamp::from_unix_seconds(1_700_000_100))))
            .with_graph_ledger(Some(self.ledger_path()))
    }
}

fn refusal(err: &AcceptError) -> &str {
    err.refusal_reason().unwrap_or_else(|| panic!("expected refusal, got {err}"))
}

/// Overwrites the offered archive as soon as verification is audited.
struct SwapOnVerify {
    target: PathBuf,
    replacement: Mutex<Option<Vec<u8>>>,
}

impl FieldpackAuditSink for SwapOnVerify {
    fn record_sealed(&self, _event: &BundleSealedEvent) {}

    fn record_verified(&self, _event: &BundleVerifiedEvent) {
        if let Some(bytes) = self.replacement.lock().unwrap().take() {
            std::fs::write(&self.target, bytes).unwrap();
        }
    }
}

/// Builds an unsigned archive carrying only a delta.
fn unsigned_archive(fx: &Fixture, delta: &str) -> Vec<u8> {
    let mut entries = BTreeMap::new();
    entries.insert("kg_delta.jsonl".to_string(), delta.as_bytes().to_vec());
    let path = write_archive(&fx.dir.path().join("forged"), "forged.tar", &entries).unwrap();
    std::fs::read(path).unwrap()
}

// ============================================================================
// SECTION: Auto-Merge
// ============================================================================

#[test]
fn auto_merge_applies_delta_and_replay_matches() {
    let fx = fixture();
    let engine = fx.engine(PolicyMode::AutoMerge);
    let bundle = fx.seal("nightly", DELTA);

    let outcome = engine.accept(&AcceptRequest::new(&bundle)).unwrap();
    assert_eq!(outcome.status, AcceptStatus::Merged);
    assert_eq!(outcome.ops_count, 3);
    assert_eq!(outcome.policy_mode, "AUTO_MERGE");
    assert!(outcome.ingested_id.is_some());
    assert_eq!(outcome.kg_shacl_ok, Some(true));

    let graph = engine.store().load_graph().unwrap();
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(
        engine.store().ledger_counts().unwrap(),
        LedgerCounts {
            kg_deltas: 1,
            ingested_bundles: 1,
            staged_bundles: 0,
            staged_decisions: 0,
        }
    );

    let report = replay_verify(engine.store(), engine.graph_ledger(), &NoopAuditSink).unwrap();
    assert!(report.ok());
    assert!(report.snapshot_match);
    assert_eq!(report.deltas_count, 1);
    let ledger = report.graph_ledger.unwrap();
    assert!(ledger.ok);
    assert_eq!(ledger.events, 1);
}

#[test]
fn reoffered_bundle_is_never_ingested_twice() {
    let fx = fixture();
    let engine = fx.engine(PolicyMode::AutoMerge);
    let bundle = fx.seal("nightly", DELTA);
    let first = engine.accept(&AcceptRequest::new(&bundle)).unwrap();
    let counts = engine.store().ledger_counts().unwrap();

    let mut idempotent = AcceptRequest::new(&bundle);
    idempotent.idempotent = true;
    let second = engine.accept(&idempotent).unwrap();
    assert_eq!(second.status, AcceptStatus::AlreadyIngested);
    assert_eq!(second.ingested_id, first.ingested_id);
    assert_eq!(engine.store().ledger_counts().unwrap(), counts);

    let third = engine.accept(&AcceptRequest::new(&bundle)).unwrap();
    assert_eq!(third.status, AcceptStatus::AlreadyIngested);
    assert_eq!(engine.store().ledger_counts().unwrap(), counts);
}

#[test]
fn invalid_graph_is_quarantined_and_rolled_back() {
    let fx = fixture();
    let engine = fx.engine(PolicyMode::AutoMerge);
    let bundle = fx.seal("dangling", DANGLING);

    let outcome = engine.accept(&AcceptRequest::new(&bundle)).unwrap();
    assert_eq!(outcome.status, AcceptStatus::Quarantined);
    assert_eq!(outcome.reason.as_deref(), Some("kg_shacl_failed_after_apply"));
    assert_eq!(outcome.kg_shacl_ok, Some(false));

    let graph = engine.store().load_graph().unwrap();
    assert_eq!(graph.node_count(), 0);
    assert_eq!(graph.edge_count(), 0);
    let counts = engine.store().ledger_counts().unwrap();
    assert_eq!(counts.kg_deltas, 0);
    assert_eq!(counts.ingested_bundles, 0);
    assert_eq!(counts.staged_bundles, 1);

    let staged = engine.list_staged(Some(StagedStatus::Quarantined)).unwrap();
    assert_eq!(staged.len(), 1);
    assert!(staged[0].row.record.verify_reason.ends_with("; kg_invalid"));
    assert!(!fx.ledger_path().exists());
}

// ============================================================================
// SECTION: Refusals
// ============================================================================

#[test]
fn kill_mode_refuses_without_side_effects() {
    let fx = fixture();
    let engine = fx.engine(PolicyMode::ReviewOnly);
    let bundle = fx.seal("nightly", DELTA);
    let mut request = AcceptRequest::new(&bundle);
    request.mode_override = Some(PolicyMode::Kill);

    let err = engine.accept(&request).unwrap_err();
    assert_eq!(refusal(&err), "policy_mode_kill");
    assert_eq!(engine.store().ledger_counts().unwrap(), LedgerCounts::default());
}

#[test]
fn growth_limits_refuse_large_deltas() {
    let fx = fixture();
    let bundle = fx.seal("nightly", DELTA);

    let engine = fx.engine(PolicyMode::AutoMerge).with_limits(AcceptLimits {
        max_new_nodes: 1,
        ..AcceptLimits::default()
    });
    let err = engine.accept(&AcceptRequest::new(&bundle)).unwrap_err();
    assert_eq!(refusal(&err), "delta_too_many_new_nodes");

    let engine = fx.engine(PolicyMode::AutoMerge).with_limits(AcceptLimits {
        max_ops: 2,
        ..AcceptLimits::default()
    });
    let err = engine.accept(&AcceptRequest::new(&bundle)).unwrap_err();
    assert_eq!(refusal(&err), "delta_too_large_ops");
    assert_eq!(engine.store().load_graph().unwrap().node_count(), 0);
}

#[test]
fn unverifiable_bundle_is_refused() {
    let fx = fixture();
    let engine = fx.engine(PolicyMode::AutoMerge);
    let bogus = fx.dir.path().join("bogus.tar");
    std::fs::write(&bogus, b"not an archive").unwrap();

    let err = engine.accept(&AcceptRequest::new(&bogus)).unwrap_err();
    assert!(refusal(&err).starts_with("bundle_verify_failed:"));
    assert_eq!(engine.store().ledger_counts().unwrap(), LedgerCounts::default());
}

#[test]
fn archive_swapped_after_verification_is_not_merged() {
    let fx = fixture();
    let bundle = fx.seal("nightly", DELTA);
    let sealed_sha256 = sha256_hex(&std::fs::read(&bundle).unwrap());
    let sink = SwapOnVerify {
        target: bundle.clone(),
        replacement: Mutex::new(Some(unsigned_archive(
            &fx,
            "{\"op\":\"ADD_NODE\",\"id\":\"evil\",\"type\":\"Backdoor\"}\n",
        ))),
    };
    let engine = fx.engine(PolicyMode::AutoMerge).with_audit(Arc::new(sink));

    let outcome = engine.accept(&AcceptRequest::new(&bundle)).unwrap();
    assert_eq!(outcome.status, AcceptStatus::Merged);
    assert_eq!(outcome.ops_count, 3);
    assert_eq!(outcome.bundle_sha256, sealed_sha256);
    assert_ne!(sha256_hex(&std::fs::read(&bundle).unwrap()), sealed_sha256);

    let graph = engine.store().load_graph().unwrap();
    assert!(graph.contains_node("n1"));
    assert!(!graph.contains_node("evil"));
    assert_eq!(graph.node_count(), 2);
}

// ============================================================================
// SECTION: Review
// ============================================================================

#[test]
fn review_only_stages_until_approved() {
    let fx = fixture();
    let engine = fx.engine(PolicyMode::ReviewOnly);
    let bundle = fx.seal("nightly", DELTA);

    let outcome = engine.accept(&AcceptRequest::new(&bundle)).unwrap();
    assert_eq!(outcome.status, AcceptStatus::Pending);
    assert_eq!(outcome.kg_shacl_ok, Some(true));
    let staged_id = outcome.staged_id.unwrap();
    assert_eq!(engine.store().load_graph().unwrap().node_count(), 0);

    let mut again = AcceptRequest::new(&bundle);
    again.idempotent = true;
    let again = engine.accept(&again).unwrap();
    assert_eq!(again.status, AcceptStatus::AlreadyStaged);
    assert_eq!(again.staged_status, Some(StagedStatus::Pending));

    let approved = engine.approve(staged_id, "reviewer", Some("looks right")).unwrap();
    assert_eq!(approved.status, AcceptStatus::Approved);
    assert!(approved.ingested_id.is_some());
    assert_eq!(engine.store().load_graph().unwrap().node_count(), 2);

    let err = engine.approve(staged_id, "reviewer", None).unwrap_err();
    assert_eq!(refusal(&err), "staged_not_pending");
    assert!(engine.list_staged(Some(StagedStatus::Pending)).unwrap().is_empty());
    let decided = engine.list_staged(Some(StagedStatus::Approved)).unwrap();
    assert_eq!(decided.len(), 1);
    assert_eq!(decided[0].decision.as_ref().unwrap().actor, "reviewer");

    let report = replay_verify(engine.store(), engine.graph_ledger(), &NoopAuditSink).unwrap();
    assert!(report.ok());
}

#[test]
fn approving_an_archive_merged_elsewhere_reports_already_ingested() {
    let fx = fixture();
    let engine = fx.engine(PolicyMode::ReviewOnly);
    let bundle = fx.seal("nightly", DELTA);
    let staged_id = engine.accept(&AcceptRequest::new(&bundle)).unwrap().staged_id.unwrap();

    let mut merge = AcceptRequest::new(&bundle);
    merge.mode_override = Some(PolicyMode::AutoMerge);
    assert_eq!(engine.accept(&merge).unwrap().status, AcceptStatus::Merged);
    let counts = engine.store().ledger_counts().unwrap();

    let err = engine.approve(staged_id, "reviewer", None).unwrap_err();
    assert_eq!(refusal(&err), "already_ingested");
    assert_eq!(engine.store().ledger_counts().unwrap(), counts);
    assert_eq!(engine.store().load_graph().unwrap().node_count(), 2);
    assert_eq!(engine.list_staged(Some(StagedStatus::Pending)).unwrap().len(), 1);
}

#[test]
fn rejected_rows_accept_no_further_decision() {
    let fx = fixture();
    let engine = fx.engine(PolicyMode::AutoMerge);
    let bundle = fx.seal("nightly", DELTA);
    let mut request = AcceptRequest::new(&bundle);
    request.mode_override = Some(PolicyMode::Quarantine);
    request.actor = Some("intake".to_string());

    let outcome = engine.accept(&request).unwrap();
    assert_eq!(outcome.status, AcceptStatus::Quarantined);
    let staged_id = outcome.staged_id.unwrap();

    let rejected = engine.reject(staged_id, "reviewer", Some("wrong site")).unwrap();
    assert_eq!(rejected.status, AcceptStatus::Rejected);
    assert_eq!(rejected.ops_count, 3);

    assert_eq!(refusal(&engine.approve(staged_id, "reviewer", None).unwrap_err()), "staged_not_pending");
    assert_eq!(refusal(&engine.reject(staged_id, "reviewer", None).unwrap_err()), "staged_not_pending");
    assert_eq!(refusal(&engine.approve(999, "reviewer", None).unwrap_err()), "staged_not_found");
    assert_eq!(engine.store().load_graph().unwrap().node_count(), 0);
}

// ============================================================================
// SECTION: Ledger Integrity
// ============================================================================

#[test]
fn ledger_rows_reject_update_and_delete() {
    let fx = fixture();
    let engine = fx.engine(PolicyMode::AutoMerge);
    engine.accept(&AcceptRequest::new(fx.seal("nightly", DELTA))).unwrap();

    for sql in ["UPDATE kg_deltas SET source = 'forged'", "DELETE FROM ingested_bundles"] {
        let err = engine
            .store()
            .write(|conn| conn.execute(sql, []).map_err(SqliteStoreError::from))
            .unwrap_err();
        assert!(matches!(err, SqliteStoreError::AppendOnly(_)), "{sql}: {err}");
    }
    assert_eq!(engine.store().ledger_counts().unwrap().ingested_bundles, 1);
}

#[test]
fn replay_detects_out_of_band_changes() {
    let fx = fixture();
    let engine = fx.engine(PolicyMode::AutoMerge);
    engine.accept(&AcceptRequest::new(fx.seal("nightly", DELTA))).unwrap();

    engine
        .store()
        .write(|conn| {
            conn.execute(
                "INSERT INTO nodes (id, node_type, attrs_json) VALUES ('rogue', 'Doc', '{}')",
                [],
            )
            .map_err(SqliteStoreError::from)
        })
        .unwrap();
    let report = replay_verify(engine.store(), None, &NoopAuditSink).unwrap();
    assert!(!report.snapshot_match);
    assert!(report.chains_ok());
    assert!(!report.ok());

    engine
        .store()
        .write(|conn| {
            conn.execute(
                "INSERT INTO kg_deltas (ts_utc, source, delta_kind, delta_payload, delta_hash, \
                 prev_hash, row_hash) VALUES ('2023-11-14T22:13:20Z', 'FIELDPACK', \
                 'BUNDLE_IMPORT', '{\"op\":\"ADD_NODE\",\"id\":\"rogue\",\"type\":\"Doc\"}', \
                 'x', NULL, 'forged')",
                [],
            )
            .map_err(SqliteStoreError::from)
        })
        .unwrap();
    let report = replay_verify(engine.store(), None, &NoopAuditSink).unwrap();
    assert!(!report.kg_deltas_chain_ok);
    assert!(report.ingested_chain_ok);
    assert!(!report.ok());
}
