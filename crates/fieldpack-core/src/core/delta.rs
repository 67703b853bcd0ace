// crates/fieldpack-core/src/core/delta.rs
// ============================================================================
// Module: Fieldpack Graph Delta
// Description: JSONL graph mutation batches and their application.
// Purpose: Parse, bound, hash, and apply `kg_delta.jsonl` payloads.
// Dependencies: crate::core::{graph, hashing}, crate::interfaces, serde_json
// ============================================================================

//! ## Overview
//! A delta is one JSON object per line with an `op` of `ADD_NODE`,
//! `ADD_EDGE`, `REMOVE_NODE`, or `REMOVE_EDGE`. Lines with any other `op` are
//! carried in the payload but skipped on apply. The stored payload is the
//! trimmed, non-empty lines joined with `\n` plus a trailing newline; its
//! SHA-256 is the delta hash recorded in the ledgers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::graph::edge_key;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::sha256_hex;
use crate::interfaces::GraphMutationError;
use crate::interfaces::GraphMutator;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Node type applied when `ADD_NODE` omits `type`.
pub const DEFAULT_NODE_TYPE: &str = "Thing";
/// Edge type applied when `ADD_EDGE` omits `type`.
pub const DEFAULT_EDGE_TYPE: &str = "RELATED";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Delta parsing errors.
#[derive(Debug, Error)]
pub enum DeltaError {
    /// A line is not a JSON object.
    #[error("delta_parse_error:{line}")]
    Parse {
        /// 1-based payload line.
        line: usize,
    },
    /// A supported op is missing a required field.
    #[error("delta_parse_error:{line}")]
    MissingField {
        /// 1-based payload line.
        line: usize,
        /// Missing field name.
        field: &'static str,
    },
    /// Canonicalization failed while normalizing lines.
    #[error("delta canonicalization failed: {0}")]
    Canonicalization(String),
}

impl DeltaError {
    /// Machine-readable refusal reason.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Parse {
                line,
            }
            | Self::MissingField {
                line, ..
            } => format!("delta_parse_error:{line}"),
            Self::Canonicalization(_) => "delta_parse_error:canonicalization".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// One supported graph mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
    /// Insert or replace a node.
    AddNode {
        /// Node id.
        id: String,
        /// Node type.
        node_type: String,
        /// Node attributes.
        attrs: Map<String, Value>,
    },
    /// Insert an edge if absent.
    AddEdge {
        /// Source node id.
        src: String,
        /// Destination node id.
        dst: String,
        /// Edge type.
        edge_type: String,
        /// Edge attributes.
        attrs: Map<String, Value>,
    },
    /// Remove a node and its incident edges.
    RemoveNode {
        /// Node id.
        id: String,
    },
    /// Remove one edge.
    RemoveEdge {
        /// Edge key.
        edge_key: String,
    },
}

impl DeltaOp {
    /// Parses one JSON object; returns `None` for unsupported ops.
    fn from_object(line: usize, object: &Map<String, Value>) -> Result<Option<Self>, DeltaError> {
        let op = object.get("op").and_then(Value::as_str).unwrap_or_default();
        let op = match op {
            "ADD_NODE" => Self::AddNode {
                id: required_str(line, object, "id")?,
                node_type: optional_str(object, "type")
                    .unwrap_or_else(|| DEFAULT_NODE_TYPE.to_string()),
                attrs: attrs_of(object),
            },
            "ADD_EDGE" => Self::AddEdge {
                src: required_str(line, object, "src")?,
                dst: required_str(line, object, "dst")?,
                edge_type: optional_str(object, "type")
                    .or_else(|| optional_str(object, "rel"))
                    .unwrap_or_else(|| DEFAULT_EDGE_TYPE.to_string()),
                attrs: attrs_of(object),
            },
            "REMOVE_NODE" => Self::RemoveNode {
                id: required_str(line, object, "id")?,
            },
            "REMOVE_EDGE" => {
                let key = match optional_str(object, "edge_key") {
                    Some(key) => key,
                    None => {
                        let src = required_str(line, object, "src")?;
                        let dst = required_str(line, object, "dst")?;
                        let edge_type = optional_str(object, "type")
                            .or_else(|| optional_str(object, "rel"))
                            .unwrap_or_else(|| DEFAULT_EDGE_TYPE.to_string());
                        edge_key(&src, &dst, &edge_type, &attrs_of(object))
                            .map_err(|err| DeltaError::Canonicalization(err.to_string()))?
                    }
                };
                Self::RemoveEdge {
                    edge_key: key,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(op))
    }
}

/// Reads a required non-empty string field.
fn required_str(
    line: usize,
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<String, DeltaError> {
    optional_str(object, field).ok_or(DeltaError::MissingField {
        line,
        field,
    })
}

/// Reads an optional string field; numbers are accepted as their text form.
fn optional_str(object: &Map<String, Value>, field: &str) -> Option<String> {
    match object.get(field)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Reads the `attrs` object, defaulting to empty.
fn attrs_of(object: &Map<String, Value>) -> Map<String, Value> {
    object.get("attrs").and_then(Value::as_object).cloned().unwrap_or_default()
}

// ============================================================================
// SECTION: Delta Batch
// ============================================================================

/// Parsed delta batch with its canonical payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphDelta {
    /// Trimmed non-empty lines joined with newlines.
    payload: String,
    /// Supported operations in payload order.
    ops: Vec<DeltaOp>,
    /// Number of payload lines, including skipped ops.
    ops_count: usize,
}

impl GraphDelta {
    /// Parses a JSONL delta payload.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError`] when a line is not a JSON object or a supported
    /// op lacks a required field.
    pub fn parse(text: &str) -> Result<Self, DeltaError> {
        let lines: Vec<&str> =
            text.lines().map(str::trim).filter(|line| !line.is_empty()).collect();
        let mut ops = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            let line_no = index + 1;
            let value: Value = serde_json::from_str(line).map_err(|_| DeltaError::Parse {
                line: line_no,
            })?;
            let Value::Object(object) = value else {
                return Err(DeltaError::Parse {
                    line: line_no,
                });
            };
            if let Some(op) = DeltaOp::from_object(line_no, &object)? {
                ops.push(op);
            }
        }
        let mut payload = lines.join("\n");
        if !payload.is_empty() {
            payload.push('\n');
        }
        Ok(Self {
            payload,
            ops,
            ops_count: lines.len(),
        })
    }

    /// Canonical payload text.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// SHA-256 of the canonical payload.
    #[must_use]
    pub fn hash(&self) -> String {
        sha256_hex(self.payload.as_bytes())
    }

    /// Number of payload lines.
    #[must_use]
    pub const fn ops_count(&self) -> usize {
        self.ops_count
    }

    /// Supported operations.
    #[must_use]
    pub fn ops(&self) -> &[DeltaOp] {
        &self.ops
    }

    /// Number of `ADD_NODE` operations.
    #[must_use]
    pub fn new_node_count(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, DeltaOp::AddNode { .. })).count()
    }

    /// Number of `ADD_EDGE` operations.
    #[must_use]
    pub fn new_edge_count(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, DeltaOp::AddEdge { .. })).count()
    }

    /// Applies every supported op in order and returns the number applied.
    ///
    /// # Errors
    ///
    /// Returns [`GraphMutationError`] when the mutator fails.
    pub fn apply<M: GraphMutator + ?Sized>(
        &self,
        graph: &mut M,
    ) -> Result<usize, GraphMutationError> {
        for op in &self.ops {
            match op {
                DeltaOp::AddNode {
                    id,
                    node_type,
                    attrs,
                } => graph.upsert_node(id, node_type, attrs)?,
                DeltaOp::AddEdge {
                    src,
                    dst,
                    edge_type,
                    attrs,
                } => {
                    graph.upsert_edge(src, dst, edge_type, attrs)?;
                }
                DeltaOp::RemoveNode {
                    id,
                } => graph.remove_node(id)?,
                DeltaOp::RemoveEdge {
                    edge_key,
                } => graph.remove_edge(edge_key)?,
            }
        }
        Ok(self.ops.len())
    }
}

// ============================================================================
// SECTION: JSONL Normalization
// ============================================================================

/// Rewrites every non-empty line as canonical JSON, newline-terminated.
///
/// # Errors
///
/// Returns [`DeltaError::Parse`] when a line is not valid JSON.
pub fn canonical_jsonl(text: &str) -> Result<String, DeltaError> {
    let mut out = String::new();
    for (index, line) in text.lines().map(str::trim).filter(|line| !line.is_empty()).enumerate() {
        let value: Value = serde_json::from_str(line).map_err(|_| DeltaError::Parse {
            line: index + 1,
        })?;
        let bytes = canonical_json_bytes(&value)
            .map_err(|err| DeltaError::Canonicalization(err.to_string()))?;
        out.push_str(&String::from_utf8_lossy(&bytes));
        out.push('\n');
    }
    Ok(out)
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
    use crate::core::graph::KnowledgeGraph;

    #[test]
    fn payload_is_trimmed_and_newline_terminated() {
        let delta = GraphDelta::parse("  {\"op\":\"ADD_NODE\",\"id\":\"a\"}  \n\n{\"op\":\"NOOP\"}\n")
            .unwrap();
        assert_eq!(delta.payload(), "{\"op\":\"ADD_NODE\",\"id\":\"a\"}\n{\"op\":\"NOOP\"}\n");
        assert_eq!(delta.ops_count(), 2);
        assert_eq!(delta.ops().len(), 1);
    }

    #[test]
    fn empty_payload_has_no_trailing_newline() {
        let delta = GraphDelta::parse("\n \n").unwrap();
        assert_eq!(delta.payload(), "");
        assert_eq!(delta.ops_count(), 0);
    }

    #[test]
    fn malformed_line_reports_its_position() {
        let err = GraphDelta::parse("{\"op\":\"ADD_NODE\",\"id\":\"a\"}\n{not json")
            .expect_err("second line is malformed");
        assert_eq!(err.reason(), "delta_parse_error:2");
    }

    #[test]
    fn remove_edge_accepts_endpoint_form() {
        let text = "{\"op\":\"ADD_NODE\",\"id\":\"a\"}\n{\"op\":\"ADD_NODE\",\"id\":\"b\"}\n\
                    {\"op\":\"ADD_EDGE\",\"src\":\"a\",\"dst\":\"b\"}\n\
                    {\"op\":\"REMOVE_EDGE\",\"src\":\"a\",\"dst\":\"b\"}\n";
        let delta = GraphDelta::parse(text).unwrap();
        let mut graph = KnowledgeGraph::new();
        delta.apply(&mut graph).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 0);
    }
}
