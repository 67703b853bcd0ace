// crates/fieldpack-core/src/interfaces/mod.rs
// ============================================================================
// Module: Fieldpack Interfaces
// Description: Injection seams for time and graph mutation.
// Purpose: Keep the sealer, verifier, and acceptance engine free of globals.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how Fieldpack reaches the outside world without reading
//! ambient state. The wall clock is injected through [`Clock`] and graph
//! mutations are routed through [`GraphMutator`], so the same delta
//! application code drives an in-memory graph and a transactional store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::time::UtcTimestamp;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current UTC instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> UtcTimestamp;
}

/// Clock backed by the host wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcTimestamp {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        UtcTimestamp::from_unix_seconds(seconds)
    }
}

/// Clock pinned to one instant, used for reproducible seals and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub UtcTimestamp);

impl Clock for FixedClock {
    fn now(&self) -> UtcTimestamp {
        self.0
    }
}

// ============================================================================
// SECTION: Graph Mutation
// ============================================================================

/// Graph mutation failures raised by a backing store.
#[derive(Debug, Error)]
#[error("graph mutation failed: {0}")]
pub struct GraphMutationError(pub String);

/// Write surface shared by the in-memory graph and the SQLite store.
///
/// # Invariants
/// - `upsert_edge` never replaces an existing edge with the same key.
/// - `remove_node` also removes every edge touching the node.
pub trait GraphMutator {
    /// Inserts or replaces a node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphMutationError`] when the backing store fails.
    fn upsert_node(
        &mut self,
        id: &str,
        node_type: &str,
        attrs: &Map<String, Value>,
    ) -> Result<(), GraphMutationError>;

    /// Inserts an edge unless one with the same key exists; returns the key.
    ///
    /// # Errors
    ///
    /// Returns [`GraphMutationError`] when the backing store fails.
    fn upsert_edge(
        &mut self,
        src: &str,
        dst: &str,
        edge_type: &str,
        attrs: &Map<String, Value>,
    ) -> Result<String, GraphMutationError>;

    /// Removes a node and its incident edges.
    ///
    /// # Errors
    ///
    /// Returns [`GraphMutationError`] when the backing store fails.
    fn remove_node(&mut self, id: &str) -> Result<(), GraphMutationError>;

    /// Removes an edge by key.
    ///
    /// # Errors
    ///
    /// Returns [`GraphMutationError`] when the backing store fails.
    fn remove_edge(&mut self, edge_key: &str) -> Result<(), GraphMutationError>;
}
