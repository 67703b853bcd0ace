// crates/fieldpack-store-sqlite/src/lib.rs
// ============================================================================
// Module: Fieldpack SQLite Store
// Description: Durable graph, append-only ledgers, and bundle acceptance.
// Purpose: Own every consumer-side mutation of the knowledge graph.
// Dependencies: fieldpack-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The consumer keeps its knowledge graph and its four hash-chained ledgers
//! in one `SQLite` database. Ledger tables reject `UPDATE` and `DELETE` at the
//! database level. [`AcceptanceEngine`] is the only writer of graph rows:
//! merges and approvals apply a delta, validate the result, and record it in
//! one transaction. [`replay_verify`] proves the graph is the fold of its
//! recorded deltas.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod accept;
pub mod graph_ledger;
pub mod replay;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use accept::AcceptError;
pub use accept::AcceptLimits;
pub use accept::AcceptOutcome;
pub use accept::AcceptRequest;
pub use accept::AcceptStatus;
pub use accept::AcceptanceEngine;
pub use accept::ReviewOutcome;
pub use graph_ledger::DEFAULT_GRAPH_LEDGER_FILE;
pub use graph_ledger::GraphLedgerError;
pub use graph_ledger::GraphLedgerEvent;
pub use graph_ledger::GraphLedgerStatus;
pub use graph_ledger::verify_ledger_chain;
pub use replay::ReplayError;
pub use replay::ReplayReport;
pub use replay::replay_verify;
pub use store::DecisionRecord;
pub use store::FieldpackStore;
pub use store::IngestedRecord;
pub use store::KgDeltaRecord;
pub use store::LedgerCounts;
pub use store::LedgerRow;
pub use store::LedgerTable;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::StagedEntry;
pub use store::StagedRecord;
pub use store::StagedStatus;
