// crates/fieldpack-store-sqlite/src/replay.rs
// ============================================================================
// Module: Ledger Replay Verification
// Description: Rebuilds the graph from the delta ledger and re-walks every chain.
// Purpose: Prove the live graph is exactly the fold of its recorded deltas.
// Dependencies: fieldpack-core, serde, thiserror
// ============================================================================

//! ## Overview
//! Replay starts from an empty graph, applies every `kg_deltas` payload in
//! row order, and compares the resulting snapshot hash with the live graph's.
//! It also recomputes the hash chain of every ledger table and, when a graph
//! ledger file is configured, of that file. Replay reads only; it never
//! repairs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use fieldpack_core::DeltaError;
use fieldpack_core::FieldpackAuditSink;
use fieldpack_core::GraphDelta;
use fieldpack_core::GraphMutationError;
use fieldpack_core::HashError;
use fieldpack_core::KnowledgeGraph;
use fieldpack_core::audit::ReplayVerifyEvent;
use fieldpack_core::audit::ReplayVerifyEventParams;
use serde::Serialize;
use thiserror::Error;

use crate::graph_ledger::GraphLedgerError;
use crate::graph_ledger::GraphLedgerStatus;
use crate::graph_ledger::verify_ledger_chain;
use crate::store::DecisionRecord;
use crate::store::FieldpackStore;
use crate::store::IngestedRecord;
use crate::store::KgDeltaRecord;
use crate::store::SqliteStoreError;
use crate::store::StagedRecord;
use crate::store::load_graph;
use crate::store::read_ledger;
use crate::store::verify_ledger;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Replay failures that prevent a verdict.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Store failure.
    #[error(transparent)]
    Store(#[from] SqliteStoreError),
    /// A recorded delta no longer parses.
    #[error("recorded delta {id} is unreadable: {source}")]
    Delta {
        /// `kg_deltas` row id.
        id: i64,
        /// Parse failure.
        source: DeltaError,
    },
    /// Replayed mutation failed.
    #[error(transparent)]
    Graph(#[from] GraphMutationError),
    /// Snapshot could not be hashed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Graph ledger file failure.
    #[error(transparent)]
    Ledger(#[from] GraphLedgerError),
}

/// Replay verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Snapshot hash of the live graph.
    pub current_snapshot_hash: String,
    /// Snapshot hash of the replayed graph.
    pub replayed_snapshot_hash: String,
    /// True when both snapshots agree.
    #[serde(rename = "match")]
    pub snapshot_match: bool,
    /// `kg_deltas` chain verdict.
    pub kg_deltas_chain_ok: bool,
    /// `ingested_bundles` chain verdict.
    pub ingested_chain_ok: bool,
    /// `staged_bundles` chain verdict.
    pub staged_chain_ok: bool,
    /// `staged_decisions` chain verdict.
    pub decisions_chain_ok: bool,
    /// Replayed delta rows.
    pub deltas_count: usize,
    /// Graph ledger file verdict, when a file is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_ledger: Option<GraphLedgerStatus>,
}

impl ReplayReport {
    /// True when every database chain holds.
    #[must_use]
    pub const fn chains_ok(&self) -> bool {
        self.kg_deltas_chain_ok
            && self.ingested_chain_ok
            && self.staged_chain_ok
            && self.decisions_chain_ok
    }

    /// True when the snapshot matches and every chain holds.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.snapshot_match
            && self.chains_ok()
            && self.graph_ledger.is_none_or(|status| status.ok)
    }
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// Replays the delta ledger and verifies every chain.
///
/// # Errors
///
/// Returns [`ReplayError`] when the store cannot be read or a recorded delta
/// cannot be replayed. Hash mismatches are reported in the verdict.
pub fn replay_verify(
    store: &FieldpackStore,
    graph_ledger: Option<&Path>,
    audit: &dyn FieldpackAuditSink,
) -> Result<ReplayReport, ReplayError> {
    let mut report = store.read(|conn| {
        let current = load_graph(conn)?;
        let deltas = read_ledger::<KgDeltaRecord>(conn)?;
        let mut replayed = KnowledgeGraph::new();
        for row in &deltas {
            let delta = GraphDelta::parse(&row.record.delta_payload).map_err(|source| {
                ReplayError::Delta {
                    id: row.id,
                    source,
                }
            })?;
            delta.apply(&mut replayed)?;
        }
        let current_snapshot_hash = current.snapshot_hash()?;
        let replayed_snapshot_hash = replayed.snapshot_hash()?;
        Ok::<_, ReplayError>(ReplayReport {
            snapshot_match: current_snapshot_hash == replayed_snapshot_hash,
            current_snapshot_hash,
            replayed_snapshot_hash,
            kg_deltas_chain_ok: verify_ledger::<KgDeltaRecord>(conn)?,
            ingested_chain_ok: verify_ledger::<IngestedRecord>(conn)?,
            staged_chain_ok: verify_ledger::<StagedRecord>(conn)?,
            decisions_chain_ok: verify_ledger::<DecisionRecord>(conn)?,
            deltas_count: deltas.len(),
            graph_ledger: None,
        })
    })?;
    if let Some(path) = graph_ledger {
        report.graph_ledger = Some(verify_ledger_chain(path)?);
    }
    audit.record_replay(&ReplayVerifyEvent::new(ReplayVerifyEventParams {
        snapshot_match: report.snapshot_match,
        chains_ok: report.chains_ok() && report.graph_ledger.is_none_or(|status| status.ok),
        deltas_count: report.deltas_count,
    }));
    Ok(report)
}
