// crates/fieldpack-store-sqlite/src/accept.rs
// ============================================================================
// Module: Bundle Acceptance Engine
// Description: Policy-gated state machine that merges, stages, or refuses bundles.
// Purpose: Apply verified graph deltas atomically and record them in the ledgers.
// Dependencies: fieldpack-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`AcceptanceEngine`] is the consumer-side context object. It owns the
//! store, local governance documents, growth limits, graph shapes, clock, and
//! audit sink, and exposes the acceptance and review operations.
//!
//! An offered bundle is re-verified locally, checked against the ledgers for
//! idempotent re-offers, resolved to an effective mode, bounded by local
//! growth limits, and dry-run against a copy of the live graph. Under
//! `AUTO_MERGE` the delta is applied inside one write transaction and the
//! mutated graph is validated before commit; a failing graph rolls the whole
//! transaction back and the bundle is staged as `QUARANTINED` instead.
//! `REVIEW_ONLY` and `QUARANTINE` stage the bundle without touching the graph.
//!
//! Invariants:
//! - No caller ever observes a graph that failed its own shape rules.
//! - An archive digest is ingested at most once (unique ledger column).
//! - A staged row receives at most one terminal decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use fieldpack_core::Allowlist;
use fieldpack_core::BundleVerifier;
use fieldpack_core::Clock;
use fieldpack_core::ContractsReport;
use fieldpack_core::FieldpackAuditSink;
use fieldpack_core::GraphDelta;
use fieldpack_core::GraphMutationError;
use fieldpack_core::MeapPolicy;
use fieldpack_core::NoopAuditSink;
use fieldpack_core::PolicyError;
use fieldpack_core::PolicyMode;
use fieldpack_core::ShapeReport;
use fieldpack_core::ShapeSet;
use fieldpack_core::SystemClock;
use fieldpack_core::TimeError;
use fieldpack_core::VerifyError;
use fieldpack_core::VerifiedBundle;
use fieldpack_core::VerifyResult;
use fieldpack_core::audit::BundleAcceptEvent;
use fieldpack_core::audit::BundleAcceptEventParams;
use fieldpack_core::audit::StagedReviewEvent;
use fieldpack_core::audit::StagedReviewEventParams;
use fieldpack_core::core::manifest::KG_DELTA_ENTRY;
use fieldpack_core::runtime::archive::ArchiveError;
use fieldpack_core::runtime::archive::read_members_from;
use fieldpack_core::runtime::verifier::contracts_report;
use fieldpack_core::sha256_hex;
use fieldpack_core::validate_graph;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::graph_ledger::GraphLedgerError;
use crate::graph_ledger::append_graph_delta_event;
use crate::store::DecisionRecord;
use crate::store::FieldpackStore;
use crate::store::IngestedRecord;
use crate::store::KgDeltaRecord;
use crate::store::SqlGraphWriter;
use crate::store::SqliteStoreError;
use crate::store::StagedEntry;
use crate::store::StagedRecord;
use crate::store::StagedStatus;
use crate::store::append;
use crate::store::find_ingested;
use crate::store::latest_staged;
use crate::store::load_graph;
use crate::store::staged_entry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Delta source recorded for bundle-driven mutations.
const DELTA_SOURCE: &str = "FIELDPACK";
/// `kg_deltas` kind for auto-merged bundles.
const DELTA_KIND_IMPORT: &str = "BUNDLE_IMPORT";
/// `kg_deltas` kind for approved staged bundles.
const DELTA_KIND_APPROVE: &str = "BUNDLE_APPROVE";
/// `ingested_bundles` kind.
const INGEST_KIND_MERGED: &str = "MERGED";
/// Reason attached when post-apply validation fails.
const REASON_SHACL_AFTER_APPLY: &str = "kg_shacl_failed_after_apply";

// ============================================================================
// SECTION: Limits and Requests
// ============================================================================

/// Consumer-side growth limits, independent of the producer's policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AcceptLimits {
    /// Maximum delta lines.
    pub max_ops: usize,
    /// Maximum `ADD_NODE` ops.
    pub max_new_nodes: usize,
    /// Maximum `ADD_EDGE` ops.
    pub max_new_edges: usize,
}

impl Default for AcceptLimits {
    fn default() -> Self {
        Self {
            max_ops: 10_000,
            max_new_nodes: 2_000,
            max_new_edges: 10_000,
        }
    }
}

/// One bundle offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptRequest {
    /// Archive path.
    pub bundle_path: PathBuf,
    /// Mode overriding the policy default.
    pub mode_override: Option<PolicyMode>,
    /// Short-circuit re-offers of already recorded bundles.
    pub idempotent: bool,
    /// Actor recorded on non-pending staged rows.
    pub actor: Option<String>,
    /// Notes recorded with the outcome.
    pub notes: Option<String>,
}

impl AcceptRequest {
    /// Offer for `bundle_path` with policy defaults.
    #[must_use]
    pub fn new(bundle_path: impl Into<PathBuf>) -> Self {
        Self {
            bundle_path: bundle_path.into(),
            mode_override: None,
            idempotent: false,
            actor: None,
            notes: None,
        }
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Acceptance and review dispositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcceptStatus {
    /// Applied to the live graph.
    Merged,
    /// Staged for review.
    Pending,
    /// Staged and held back.
    Quarantined,
    /// Staged bundle applied by a reviewer.
    Approved,
    /// Staged bundle refused by a reviewer.
    Rejected,
    /// Archive digest already merged.
    AlreadyIngested,
    /// Archive digest already staged.
    AlreadyStaged,
}

impl AcceptStatus {
    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merged => "MERGED",
            Self::Pending => "PENDING",
            Self::Quarantined => "QUARANTINED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::AlreadyIngested => "ALREADY_INGESTED",
            Self::AlreadyStaged => "ALREADY_STAGED",
        }
    }
}

/// Result of offering one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptOutcome {
    /// Disposition.
    pub status: AcceptStatus,
    /// SHA-256 of the archive bytes.
    pub bundle_sha256: String,
    /// Archive file name.
    pub bundle_name: String,
    /// Effective mode.
    pub policy_mode: String,
    /// Delta line count.
    pub ops_count: usize,
    /// Delta payload hash.
    pub delta_hash: String,
    /// `ingested_bundles` row, when merged or already ingested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingested_id: Option<i64>,
    /// `staged_bundles` row, when staged or already staged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged_id: Option<i64>,
    /// Effective status of an already staged row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged_status: Option<StagedStatus>,
    /// Quarantine reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Dry-run validation verdict, when a dry run happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kg_shacl_ok: Option<bool>,
    /// True when every embedded contract validated.
    pub contracts_ok: bool,
}

/// Result of a review decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewOutcome {
    /// `APPROVED` or `REJECTED`.
    pub status: AcceptStatus,
    /// Staged row decided.
    pub staged_id: i64,
    /// `ingested_bundles` row created by an approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingested_id: Option<i64>,
    /// Delta payload hash.
    pub delta_hash: String,
    /// Delta line count.
    pub ops_count: usize,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Acceptance failures.
///
/// [`AcceptError::Refused`] carries data-describable refusals; every other
/// variant is an environment fault.
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The offer or review was refused.
    #[error("{reason}")]
    Refused {
        /// Machine-readable reason.
        reason: String,
    },
    /// Verification could not reach a verdict.
    #[error(transparent)]
    Verify(#[from] VerifyError),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] SqliteStoreError),
    /// Archive read failure.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// Graph ledger file failure.
    #[error(transparent)]
    Ledger(#[from] GraphLedgerError),
    /// Local governance documents could not be hashed.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Clock value could not be rendered.
    #[error(transparent)]
    Time(#[from] TimeError),
    /// Graph mutation failed.
    #[error(transparent)]
    Graph(#[from] GraphMutationError),
    /// Archive file could not be read.
    #[error("acceptance io error: {0}")]
    Io(String),
    /// Report could not be serialized.
    #[error("acceptance encode error: {0}")]
    Encode(String),
}

impl AcceptError {
    /// Builds a refusal.
    fn refused(reason: impl Into<String>) -> Self {
        Self::Refused {
            reason: reason.into(),
        }
    }

    /// Refusal reason, when this is a refusal.
    #[must_use]
    pub fn refusal_reason(&self) -> Option<&str> {
        match self {
            Self::Refused {
                reason,
            } => Some(reason),
            _ => None,
        }
    }
}

/// Why an auto-merge transaction rolled back.
enum MergeAbort {
    /// Post-apply validation failed.
    Invalid(ShapeReport),
    /// Any other failure.
    Failed(AcceptError),
}

impl From<SqliteStoreError> for MergeAbort {
    fn from(err: SqliteStoreError) -> Self {
        Self::Failed(err.into())
    }
}

// ============================================================================
// SECTION: Offer Context
// ============================================================================

/// Everything derived from a verified bundle before disposition.
struct Offer {
    /// Verifier verdict.
    verdict: VerifyResult,
    /// Archive digest.
    bundle_sha256: String,
    /// Archive file name.
    bundle_name: String,
    /// Parsed delta.
    delta: GraphDelta,
    /// Embedded contract report.
    contracts: ContractsReport,
    /// Local policy hash.
    policy_hash: String,
    /// Local allowlist hash.
    allowlist_hash: String,
}

impl Offer {
    /// Outcome skeleton shared by every disposition.
    fn outcome(&self, status: AcceptStatus, mode: &str) -> AcceptOutcome {
        AcceptOutcome {
            status,
            bundle_sha256: self.bundle_sha256.clone(),
            bundle_name: self.bundle_name.clone(),
            policy_mode: mode.to_string(),
            ops_count: self.delta.ops_count(),
            delta_hash: self.delta.hash(),
            ingested_id: None,
            staged_id: None,
            staged_status: None,
            reason: None,
            kg_shacl_ok: None,
            contracts_ok: self.contracts.ok(),
        }
    }

    /// Toolchain id from the verdict.
    fn toolchain_id(&self) -> String {
        self.verdict.toolchain_id.clone().unwrap_or_default()
    }

    /// Bundle map hash from the verdict.
    fn bundle_map_hash(&self) -> String {
        self.verdict.bundle_map_hash.clone().unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Consumer-side acceptance context.
pub struct AcceptanceEngine {
    /// Graph and ledger store.
    store: FieldpackStore,
    /// Local policy.
    policy: MeapPolicy,
    /// Local allowlist.
    allowlist: Allowlist,
    /// Growth limits.
    limits: AcceptLimits,
    /// Graph shapes.
    shapes: ShapeSet,
    /// Ledger timestamp source.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn FieldpackAuditSink>,
    /// Optional graph ledger file.
    graph_ledger: Option<PathBuf>,
}

impl AcceptanceEngine {
    /// Creates an engine with default limits, built-in shapes, the system
    /// clock, no audit output, and no graph ledger file.
    #[must_use]
    pub fn new(store: FieldpackStore, policy: MeapPolicy, allowlist: Allowlist) -> Self {
        Self {
            store,
            policy,
            allowlist,
            limits: AcceptLimits::default(),
            shapes: ShapeSet::default(),
            clock: Arc::new(SystemClock),
            audit: Arc::new(NoopAuditSink),
            graph_ledger: None,
        }
    }

    /// Replaces the growth limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: AcceptLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the graph shapes.
    #[must_use]
    pub fn with_shapes(mut self, shapes: ShapeSet) -> Self {
        self.shapes = shapes;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn FieldpackAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Sets the graph ledger file.
    #[must_use]
    pub fn with_graph_ledger(mut self, path: Option<PathBuf>) -> Self {
        self.graph_ledger = path;
        self
    }

    /// Underlying store.
    #[must_use]
    pub const fn store(&self) -> &FieldpackStore {
        &self.store
    }

    /// Graph ledger file, when configured.
    #[must_use]
    pub fn graph_ledger(&self) -> Option<&Path> {
        self.graph_ledger.as_deref()
    }

    /// Lists staged rows newest first, optionally filtered by effective status.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptError::Store`] when rows cannot be read.
    pub fn list_staged(&self, status: Option<StagedStatus>) -> Result<Vec<StagedEntry>, AcceptError> {
        Ok(self.store.list_staged(status)?)
    }

    // ------------------------------------------------------------------------
    // Offer
    // ------------------------------------------------------------------------

    /// Offers one bundle and records an audit event for the result.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptError::Refused`] for data-describable refusals and
    /// other variants for environment faults. Refusals leave no side effect.
    pub fn accept(&self, request: &AcceptRequest) -> Result<AcceptOutcome, AcceptError> {
        let result = self.accept_inner(request);
        let params = match &result {
            Ok(outcome) => BundleAcceptEventParams {
                bundle_path: request.bundle_path.display().to_string(),
                bundle_sha256: Some(outcome.bundle_sha256.clone()),
                mode: Some(outcome.policy_mode.clone()),
                status: outcome.status.as_str().to_string(),
                reason: outcome.reason.clone(),
                staged_id: outcome.staged_id,
                ops_count: Some(outcome.ops_count),
            },
            Err(err) => BundleAcceptEventParams {
                bundle_path: request.bundle_path.display().to_string(),
                bundle_sha256: None,
                mode: request.mode_override.map(|mode| mode.as_str().to_string()),
                status: "REFUSED".to_string(),
                reason: Some(err.to_string()),
                staged_id: None,
                ops_count: None,
            },
        };
        self.audit.record_accept(&BundleAcceptEvent::new(params));
        result
    }

    /// Runs the acceptance algorithm.
    fn accept_inner(&self, request: &AcceptRequest) -> Result<AcceptOutcome, AcceptError> {
        let offer = self.prepare_offer(&request.bundle_path)?;

        if request.idempotent
            && let Some(outcome) = self.already_recorded(&offer, request.mode_override)?
        {
            return Ok(outcome);
        }

        let mode = request.mode_override.unwrap_or(self.policy.mode);
        if mode == PolicyMode::Kill {
            return Err(AcceptError::refused("policy_mode_kill"));
        }
        self.check_limits(&offer.delta)?;

        let preflight = self.dry_run(&offer.delta)?;
        match mode {
            PolicyMode::AutoMerge => self.auto_merge(&offer, request, &preflight),
            PolicyMode::ReviewOnly | PolicyMode::Quarantine => {
                let status = if mode == PolicyMode::ReviewOnly {
                    StagedStatus::Pending
                } else {
                    StagedStatus::Quarantined
                };
                let decided = status != StagedStatus::Pending;
                let staged_id = self.stage(
                    &offer,
                    status,
                    mode,
                    &preflight,
                    offer.verdict.reason.clone(),
                    decided.then(|| request.actor.clone()).flatten(),
                    decided.then(|| request.notes.clone()).flatten(),
                )?;
                let mut outcome = offer.outcome(status_to_accept(status), mode.as_str());
                outcome.staged_id = Some(staged_id);
                outcome.kg_shacl_ok = Some(preflight.ok);
                Ok(outcome)
            }
            PolicyMode::Kill => Err(AcceptError::refused("policy_mode_kill")),
        }
    }

    /// Verifies the archive and extracts its delta and contracts.
    ///
    /// The file is read once; hashing, verification, and extraction all use
    /// that buffer.
    fn prepare_offer(&self, path: &Path) -> Result<Offer, AcceptError> {
        let verifier = BundleVerifier::new(&self.policy, &self.allowlist, self.audit.as_ref());
        let VerifiedBundle {
            result: verdict,
            bytes,
        } = verifier.verify_retaining(path)?;
        if !verdict.ok {
            return Err(AcceptError::refused(format!("bundle_verify_failed:{}", verdict.reason)));
        }
        let bundle_sha256 = sha256_hex(&bytes);
        let bundle_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let members = read_members_from(bytes.as_slice())?;
        let Some(delta_bytes) = members.get(KG_DELTA_ENTRY) else {
            return Err(AcceptError::refused("missing_kg_delta"));
        };
        let delta = GraphDelta::parse(&String::from_utf8_lossy(delta_bytes))
            .map_err(|err| AcceptError::refused(err.reason()))?;
        Ok(Offer {
            verdict,
            bundle_sha256,
            bundle_name,
            delta,
            contracts: contracts_report(&members),
            policy_hash: self.policy.canonical_hash()?,
            allowlist_hash: self.allowlist.canonical_hash()?,
        })
    }

    /// Returns the short-circuit outcome when the archive is already recorded.
    fn already_recorded(
        &self,
        offer: &Offer,
        mode_override: Option<PolicyMode>,
    ) -> Result<Option<AcceptOutcome>, AcceptError> {
        let mode = mode_override.unwrap_or(self.policy.mode);
        if let Some(row) = self.store.read(|conn| find_ingested(conn, &offer.bundle_sha256))? {
            let mut outcome = offer.outcome(AcceptStatus::AlreadyIngested, mode.as_str());
            outcome.ingested_id = Some(row.id);
            return Ok(Some(outcome));
        }
        let staged = self.store.read(|conn| {
            let Some(row) = latest_staged(conn, &offer.bundle_sha256)? else {
                return Ok::<_, SqliteStoreError>(None);
            };
            staged_entry(conn, row.id)
        })?;
        if let Some(entry) = staged {
            let mut outcome = offer.outcome(AcceptStatus::AlreadyStaged, &entry.row.record.policy_mode);
            outcome.staged_id = Some(entry.row.id);
            outcome.staged_status = Some(entry.effective_status);
            return Ok(Some(outcome));
        }
        Ok(None)
    }

    /// Enforces consumer-side growth limits.
    fn check_limits(&self, delta: &GraphDelta) -> Result<(), AcceptError> {
        if delta.ops_count() > self.limits.max_ops {
            return Err(AcceptError::refused("delta_too_large_ops"));
        }
        if delta.new_node_count() > self.limits.max_new_nodes {
            return Err(AcceptError::refused("delta_too_many_new_nodes"));
        }
        if delta.new_edge_count() > self.limits.max_new_edges {
            return Err(AcceptError::refused("delta_too_many_new_edges"));
        }
        Ok(())
    }

    /// Applies `delta` to a copy of the live graph and validates the result.
    fn dry_run(&self, delta: &GraphDelta) -> Result<ShapeReport, AcceptError> {
        let mut graph = self.store.load_graph()?;
        delta.apply(&mut graph)?;
        Ok(validate_graph(&graph, &self.shapes))
    }

    /// Applies, validates, and records a delta in one transaction.
    ///
    /// Rolls back and returns [`MergeAbort::Invalid`] when the mutated graph
    /// fails validation.
    fn commit_delta(
        &self,
        delta: &GraphDelta,
        delta_kind: &str,
        ingested: &IngestedRecord,
        decision: Option<&DecisionRecord>,
    ) -> Result<i64, MergeAbort> {
        let ts_utc = self.now().map_err(MergeAbort::Failed)?;
        self.store.write(|conn| {
            let mut writer = SqlGraphWriter::new(conn);
            delta.apply(&mut writer).map_err(|err| MergeAbort::Failed(err.into()))?;
            let after = validate_graph(&load_graph(conn)?, &self.shapes);
            if !after.ok {
                return Err(MergeAbort::Invalid(after));
            }
            append(
                conn,
                &KgDeltaRecord {
                    ts_utc: ts_utc.clone(),
                    source: DELTA_SOURCE.to_string(),
                    delta_kind: delta_kind.to_string(),
                    delta_payload: delta.payload().to_string(),
                    delta_hash: delta.hash(),
                },
            )?;
            let ingested_id = append(conn, ingested)?;
            if let Some(decision) = decision {
                append(conn, decision)?;
            }
            Ok(ingested_id)
        })
    }

    /// `AUTO_MERGE` path: commit, or quarantine when validation fails.
    fn auto_merge(
        &self,
        offer: &Offer,
        request: &AcceptRequest,
        preflight: &ShapeReport,
    ) -> Result<AcceptOutcome, AcceptError> {
        let mode = PolicyMode::AutoMerge.as_str();
        let ingested = IngestedRecord {
            ts_utc: self.now()?,
            bundle_sha256: offer.bundle_sha256.clone(),
            bundle_name: offer.bundle_name.clone(),
            verify_reason: offer.verdict.reason.clone(),
            policy_id: self.policy.policy_id.clone(),
            policy_hash: offer.policy_hash.clone(),
            allowlist_hash: offer.allowlist_hash.clone(),
            toolchain_id: offer.toolchain_id(),
            bundle_map_hash: offer.bundle_map_hash(),
            ops_count: to_i64(offer.delta.ops_count())?,
            kg_delta_hash: offer.delta.hash(),
            ingest_kind: INGEST_KIND_MERGED.to_string(),
            notes: request.notes.clone(),
        };
        match self.commit_delta(&offer.delta, DELTA_KIND_IMPORT, &ingested, None) {
            Ok(ingested_id) => {
                self.append_graph_ledger(DELTA_KIND_IMPORT, &offer.delta, &ingested, ingested_id)?;
                let mut outcome = offer.outcome(AcceptStatus::Merged, mode);
                outcome.ingested_id = Some(ingested_id);
                outcome.kg_shacl_ok = Some(true);
                Ok(outcome)
            }
            Err(MergeAbort::Invalid(after)) => {
                let staged_id = self.stage(
                    offer,
                    StagedStatus::Quarantined,
                    PolicyMode::AutoMerge,
                    &after,
                    format!("{}; kg_invalid", offer.verdict.reason),
                    request.actor.clone(),
                    request.notes.clone(),
                )?;
                let mut outcome = offer.outcome(AcceptStatus::Quarantined, mode);
                outcome.staged_id = Some(staged_id);
                outcome.reason = Some(REASON_SHACL_AFTER_APPLY.to_string());
                outcome.kg_shacl_ok = Some(preflight.ok);
                Ok(outcome)
            }
            Err(MergeAbort::Failed(AcceptError::Store(SqliteStoreError::Duplicate(_)))) => {
                let row = self.store.read(|conn| find_ingested(conn, &offer.bundle_sha256))?;
                let mut outcome = offer.outcome(AcceptStatus::AlreadyIngested, mode);
                outcome.ingested_id = row.map(|row| row.id);
                Ok(outcome)
            }
            Err(MergeAbort::Failed(err)) => Err(err),
        }
    }

    /// Appends a staged row.
    #[allow(clippy::too_many_arguments, reason = "Staged rows carry the full offer context.")]
    fn stage(
        &self,
        offer: &Offer,
        status: StagedStatus,
        mode: PolicyMode,
        report: &ShapeReport,
        verify_reason: String,
        actor: Option<String>,
        notes: Option<String>,
    ) -> Result<i64, AcceptError> {
        let record = StagedRecord {
            ts_utc: self.now()?,
            bundle_sha256: offer.bundle_sha256.clone(),
            bundle_name: offer.bundle_name.clone(),
            verify_reason,
            policy_id: self.policy.policy_id.clone(),
            policy_hash: offer.policy_hash.clone(),
            allowlist_hash: offer.allowlist_hash.clone(),
            toolchain_id: offer.toolchain_id(),
            bundle_map_hash: offer.bundle_map_hash(),
            ops_count: to_i64(offer.delta.ops_count())?,
            kg_delta_payload: offer.delta.payload().to_string(),
            kg_delta_hash: offer.delta.hash(),
            status,
            policy_mode: mode.as_str().to_string(),
            contracts_report_json: to_json(&offer.contracts)?,
            kg_shacl_report_json: to_json(report)?,
            actor,
            notes,
        };
        Ok(self.store.write(|conn| append(conn, &record))?)
    }

    // ------------------------------------------------------------------------
    // Review
    // ------------------------------------------------------------------------

    /// Approves a pending or quarantined staged bundle.
    ///
    /// Re-runs the dry run against the current graph, then applies and
    /// validates inside one transaction exactly as `AUTO_MERGE` does.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptError::Refused`] with `staged_not_found`,
    /// `staged_not_pending`, `already_ingested`,
    /// `cannot_approve:kg_shacl_failed`, or `kg_shacl_failed_after_apply`;
    /// other variants for environment faults.
    pub fn approve(
        &self,
        staged_id: i64,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<ReviewOutcome, AcceptError> {
        let result = self.approve_inner(staged_id, actor, notes);
        self.record_review(staged_id, StagedStatus::Approved, actor, &result);
        result
    }

    /// Runs the approval.
    fn approve_inner(
        &self,
        staged_id: i64,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<ReviewOutcome, AcceptError> {
        let entry = self.open_staged(staged_id)?;
        let record = &entry.row.record;
        let delta = GraphDelta::parse(&record.kg_delta_payload)
            .map_err(|err| AcceptError::refused(err.reason()))?;
        if !self.dry_run(&delta)?.ok {
            return Err(AcceptError::refused("cannot_approve:kg_shacl_failed"));
        }
        let ts_utc = self.now()?;
        let ingested = IngestedRecord {
            ts_utc: ts_utc.clone(),
            bundle_sha256: record.bundle_sha256.clone(),
            bundle_name: record.bundle_name.clone(),
            verify_reason: record.verify_reason.clone(),
            policy_id: record.policy_id.clone(),
            policy_hash: record.policy_hash.clone(),
            allowlist_hash: record.allowlist_hash.clone(),
            toolchain_id: record.toolchain_id.clone(),
            bundle_map_hash: record.bundle_map_hash.clone(),
            ops_count: record.ops_count,
            kg_delta_hash: record.kg_delta_hash.clone(),
            ingest_kind: INGEST_KIND_MERGED.to_string(),
            notes: notes.map(str::to_string),
        };
        let decision = DecisionRecord {
            ts_utc,
            staged_id,
            decision: StagedStatus::Approved,
            actor: actor.to_string(),
            notes: notes.map(str::to_string),
        };
        let ingested_id =
            match self.commit_delta(&delta, DELTA_KIND_APPROVE, &ingested, Some(&decision)) {
                Ok(id) => id,
                Err(MergeAbort::Invalid(_)) => {
                    return Err(AcceptError::refused(REASON_SHACL_AFTER_APPLY));
                }
                Err(MergeAbort::Failed(AcceptError::Store(SqliteStoreError::Duplicate(_)))) => {
                    return Err(self.approval_conflict(&record.bundle_sha256));
                }
                Err(MergeAbort::Failed(err)) => return Err(err),
            };
        self.append_graph_ledger(DELTA_KIND_APPROVE, &delta, &ingested, ingested_id)?;
        Ok(ReviewOutcome {
            status: AcceptStatus::Approved,
            staged_id,
            ingested_id: Some(ingested_id),
            delta_hash: delta.hash(),
            ops_count: delta.ops_count(),
        })
    }

    /// Names the unique key an approval collided with: the archive was merged
    /// through another offer, or the staged row was decided concurrently.
    fn approval_conflict(&self, bundle_sha256: &str) -> AcceptError {
        match self.store.read(|conn| find_ingested(conn, bundle_sha256)) {
            Ok(Some(_)) => AcceptError::refused("already_ingested"),
            Ok(None) => AcceptError::refused("staged_not_pending"),
            Err(err) => err.into(),
        }
    }

    /// Rejects a pending or quarantined staged bundle.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptError::Refused`] with `staged_not_found` or
    /// `staged_not_pending`; other variants for environment faults.
    pub fn reject(
        &self,
        staged_id: i64,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<ReviewOutcome, AcceptError> {
        let result = self.reject_inner(staged_id, actor, notes);
        self.record_review(staged_id, StagedStatus::Rejected, actor, &result);
        result
    }

    /// Runs the rejection.
    fn reject_inner(
        &self,
        staged_id: i64,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<ReviewOutcome, AcceptError> {
        let entry = self.open_staged(staged_id)?;
        let decision = DecisionRecord {
            ts_utc: self.now()?,
            staged_id,
            decision: StagedStatus::Rejected,
            actor: actor.to_string(),
            notes: notes.map(str::to_string),
        };
        match self.store.write(|conn| append(conn, &decision)) {
            Ok(_) => {}
            Err(SqliteStoreError::Duplicate(_)) => {
                return Err(AcceptError::refused("staged_not_pending"));
            }
            Err(err) => return Err(err.into()),
        }
        let ops_count = usize::try_from(entry.row.record.ops_count)
            .map_err(|_| SqliteStoreError::Corrupt("negative ops_count".to_string()))?;
        Ok(ReviewOutcome {
            status: AcceptStatus::Rejected,
            staged_id,
            ingested_id: None,
            delta_hash: entry.row.record.kg_delta_hash,
            ops_count,
        })
    }

    /// Loads a staged row that still accepts a decision.
    fn open_staged(&self, staged_id: i64) -> Result<StagedEntry, AcceptError> {
        let Some(entry) = self.store.read(|conn| staged_entry(conn, staged_id))? else {
            return Err(AcceptError::refused("staged_not_found"));
        };
        if !entry.effective_status.is_open() {
            return Err(AcceptError::refused("staged_not_pending"));
        }
        Ok(entry)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Current clock value as RFC 3339.
    fn now(&self) -> Result<String, AcceptError> {
        Ok(self.clock.now().to_rfc3339()?)
    }

    /// Appends a graph ledger event when a ledger file is configured.
    fn append_graph_ledger(
        &self,
        source: &str,
        delta: &GraphDelta,
        ingested: &IngestedRecord,
        ingested_id: i64,
    ) -> Result<(), AcceptError> {
        let Some(path) = &self.graph_ledger else {
            return Ok(());
        };
        let meta = json!({
            "bundle_sha256": ingested.bundle_sha256,
            "bundle_name": ingested.bundle_name,
            "delta_hash": ingested.kg_delta_hash,
            "ingested_id": ingested_id,
            "policy_id": ingested.policy_id,
            "policy_hash": ingested.policy_hash,
            "allowlist_hash": ingested.allowlist_hash,
            "toolchain_id": ingested.toolchain_id,
            "bundle_map_hash": ingested.bundle_map_hash,
        });
        append_graph_delta_event(path, source, delta, meta)?;
        Ok(())
    }

    /// Emits a review audit event.
    fn record_review(
        &self,
        staged_id: i64,
        decision: StagedStatus,
        actor: &str,
        result: &Result<ReviewOutcome, AcceptError>,
    ) {
        self.audit.record_review(&StagedReviewEvent::new(StagedReviewEventParams {
            staged_id,
            decision: decision.as_str().to_string(),
            actor: actor.to_string(),
            ok: result.is_ok(),
            reason: result.as_ref().err().map(ToString::to_string),
        }));
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a staging status onto the matching disposition.
const fn status_to_accept(status: StagedStatus) -> AcceptStatus {
    match status {
        StagedStatus::Pending => AcceptStatus::Pending,
        StagedStatus::Quarantined => AcceptStatus::Quarantined,
        StagedStatus::Approved => AcceptStatus::Approved,
        StagedStatus::Rejected => AcceptStatus::Rejected,
    }
}

/// Converts a count into a ledger integer.
fn to_i64(value: usize) -> Result<i64, AcceptError> {
    i64::try_from(value).map_err(|_| AcceptError::refused("delta_too_large_ops"))
}

/// Serializes a report as compact JSON.
fn to_json<T: Serialize>(value: &T) -> Result<String, AcceptError> {
    let value: Value =
        serde_json::to_value(value).map_err(|err| AcceptError::Encode(err.to_string()))?;
    Ok(value.to_string())
}
