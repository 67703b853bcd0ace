// crates/fieldpack-core/src/core/graph.rs
// ============================================================================
// Module: Fieldpack Knowledge Graph
// Description: Fully-owned node/edge index with deterministic snapshots.
// Purpose: Dry-run deltas, replay the ledger, and hash graph state.
// Dependencies: crate::core::hashing, crate::interfaces, serde_json
// ============================================================================

//! ## Overview
//! Nodes are keyed by their string id and edges by a content-derived key, so
//! the graph is a plain serializable value with no shared references. Two
//! graphs holding the same nodes and edges always produce the same
//! [`KnowledgeGraph::snapshot_hash`], regardless of insertion order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::hashing::HashError;
use crate::core::hashing::canonical_sha256_hex;
use crate::interfaces::GraphMutationError;
use crate::interfaces::GraphMutator;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Graph node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable node identifier.
    pub id: String,
    /// Node type label.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Free-form attributes.
    pub attrs: Map<String, Value>,
}

/// Graph edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Content-derived key (see [`edge_key`]).
    pub edge_key: String,
    /// Source node id.
    pub src: String,
    /// Destination node id.
    pub dst: String,
    /// Edge type label.
    #[serde(rename = "type")]
    pub edge_type: String,
    /// Free-form attributes.
    pub attrs: Map<String, Value>,
}

/// Canonical identity of an edge.
#[derive(Serialize)]
struct EdgeIdentity<'a> {
    /// Source node id.
    src: &'a str,
    /// Destination node id.
    dst: &'a str,
    /// Edge type label.
    #[serde(rename = "type")]
    edge_type: &'a str,
    /// Edge attributes.
    attrs: &'a Map<String, Value>,
}

/// Computes the stable edge key `sha256(canonical({src, dst, type, attrs}))`.
///
/// # Errors
///
/// Returns [`HashError`] when the attributes cannot be canonicalized.
pub fn edge_key(
    src: &str,
    dst: &str,
    edge_type: &str,
    attrs: &Map<String, Value>,
) -> Result<String, HashError> {
    canonical_sha256_hex(&EdgeIdentity {
        src,
        dst,
        edge_type,
        attrs,
    })
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Deterministic serialization of a graph used for snapshot hashing.
#[derive(Debug, Serialize)]
pub struct GraphSnapshot<'a> {
    /// Nodes ordered by id.
    pub nodes: Vec<&'a GraphNode>,
    /// Edges ordered by key.
    pub edges: Vec<&'a GraphEdge>,
}

/// Hashes a snapshot built from ordered node and edge lists.
///
/// Callers must pass nodes sorted by id and edges sorted by key.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn snapshot_hash_of(nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<String, HashError> {
    canonical_sha256_hex(&GraphSnapshot {
        nodes: nodes.iter().collect(),
        edges: edges.iter().collect(),
    })
}

// ============================================================================
// SECTION: Graph
// ============================================================================

/// In-memory knowledge graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeGraph {
    /// Nodes keyed by id.
    nodes: BTreeMap<String, GraphNode>,
    /// Edges keyed by edge key.
    edges: BTreeMap<String, GraphEdge>,
}

impl KnowledgeGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from stored records.
    #[must_use]
    pub fn from_parts(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|node| (node.id.clone(), node)).collect(),
            edges: edges.into_iter().map(|edge| (edge.edge_key.clone(), edge)).collect(),
        }
    }

    /// Returns nodes ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Returns edges ordered by key.
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Returns true when `id` names a node.
    #[must_use]
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Computes the snapshot hash of the full node/edge set.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn snapshot_hash(&self) -> Result<String, HashError> {
        canonical_sha256_hex(&GraphSnapshot {
            nodes: self.nodes.values().collect(),
            edges: self.edges.values().collect(),
        })
    }
}

impl GraphMutator for KnowledgeGraph {
    fn upsert_node(
        &mut self,
        id: &str,
        node_type: &str,
        attrs: &Map<String, Value>,
    ) -> Result<(), GraphMutationError> {
        self.nodes.insert(
            id.to_string(),
            GraphNode {
                id: id.to_string(),
                node_type: node_type.to_string(),
                attrs: attrs.clone(),
            },
        );
        Ok(())
    }

    fn upsert_edge(
        &mut self,
        src: &str,
        dst: &str,
        edge_type: &str,
        attrs: &Map<String, Value>,
    ) -> Result<String, GraphMutationError> {
        let key = edge_key(src, dst, edge_type, attrs)
            .map_err(|err| GraphMutationError(err.to_string()))?;
        self.edges.entry(key.clone()).or_insert_with(|| GraphEdge {
            edge_key: key.clone(),
            src: src.to_string(),
            dst: dst.to_string(),
            edge_type: edge_type.to_string(),
            attrs: attrs.clone(),
        });
        Ok(key)
    }

    fn remove_node(&mut self, id: &str) -> Result<(), GraphMutationError> {
        self.edges.retain(|_, edge| edge.src != id && edge.dst != id);
        self.nodes.remove(id);
        Ok(())
    }

    fn remove_edge(&mut self, edge_key: &str) -> Result<(), GraphMutationError> {
        self.edges.remove(edge_key);
        Ok(())
    }
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

    use serde_json::json;

    use super::*;

    fn attrs(value: &Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn snapshot_is_insertion_order_independent() -> Result<(), GraphMutationError> {
        let mut first = KnowledgeGraph::new();
        first.upsert_node("a", "Thing", &attrs(&json!({"name": "A"})))?;
        first.upsert_node("b", "Thing", &Map::new())?;
        first.upsert_edge("a", "b", "RELATED", &Map::new())?;

        let mut second = KnowledgeGraph::new();
        second.upsert_edge("a", "b", "RELATED", &Map::new())?;
        second.upsert_node("b", "Thing", &Map::new())?;
        second.upsert_node("a", "Thing", &attrs(&json!({"name": "A"})))?;

        assert_eq!(first.snapshot_hash().ok(), second.snapshot_hash().ok());
        Ok(())
    }

    #[test]
    fn removing_node_drops_incident_edges() -> Result<(), GraphMutationError> {
        let mut graph = KnowledgeGraph::new();
        graph.upsert_node("a", "Thing", &Map::new())?;
        graph.upsert_node("b", "Thing", &Map::new())?;
        graph.upsert_node("c", "Thing", &Map::new())?;
        graph.upsert_edge("a", "b", "RELATED", &Map::new())?;
        graph.upsert_edge("c", "a", "RELATED", &Map::new())?;
        graph.upsert_edge("b", "c", "RELATED", &Map::new())?;
        graph.remove_node("a")?;
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        Ok(())
    }

    #[test]
    fn duplicate_edge_is_ignored() -> Result<(), GraphMutationError> {
        let mut graph = KnowledgeGraph::new();
        let first = graph.upsert_edge("a", "b", "RELATED", &Map::new())?;
        let second = graph.upsert_edge("a", "b", "RELATED", &Map::new())?;
        assert_eq!(first, second);
        assert_eq!(graph.edge_count(), 1);
        Ok(())
    }
}
