// crates/fieldpack-core/src/core/shacl.rs
// ============================================================================
// Module: Fieldpack Graph Shape Validation
// Description: SHACL-lite required-field and referential-integrity rules.
// Purpose: Decide whether a graph state may be committed.
// Dependencies: crate::core::graph, serde, serde_json, serde_yaml
// ============================================================================

//! ## Overview
//! Shapes target nodes or edges (all of them, by type, or by attribute
//! presence) and list required dotted paths with optional type, constant, and
//! minimum-length checks. Two graph-wide rules are supported: edges must
//! reference existing nodes, and self-loops are flagged. A report is `ok`
//! only when no issue has `error` severity.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::graph::KnowledgeGraph;

// ============================================================================
// SECTION: Shape Documents
// ============================================================================

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks commit.
    #[default]
    Error,
    /// Reported only.
    Warn,
    /// Reported only.
    Info,
}

/// Shape target selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShapeTarget {
    /// Every node.
    AllNodes,
    /// Nodes whose type matches `type` (case-insensitive).
    NodeType,
    /// Nodes carrying attribute `attr`.
    NodeAttrPresent,
    /// Every edge.
    AllEdges,
    /// Edges whose type matches `type` (case-insensitive).
    EdgeType,
    /// Edges carrying attribute `attr`.
    EdgeAttrPresent,
}

/// Required field rule inside a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredField {
    /// Dotted path into `{id, type, attrs}` or `{src, dst, type, attrs}`.
    pub path: String,
    /// Expected JSON type (`string`, `number`, `integer`, `boolean`, `object`, `array`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    /// Minimum string length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    /// Required constant value.
    #[serde(rename = "const", default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<Value>,
    /// Severity override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// A node or edge shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    /// Target selector; defaults to all nodes or all edges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ShapeTarget>,
    /// Type matched by `NODE_TYPE` / `EDGE_TYPE`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Attribute matched by `*_ATTR_PRESENT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    /// Required fields.
    #[serde(default)]
    pub required: Vec<RequiredField>,
    /// Default severity for this shape's rules.
    #[serde(default)]
    pub severity: Severity,
}

/// Referential integrity rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferentialRules {
    /// Edge endpoints must name existing nodes.
    #[serde(default)]
    pub edges_must_reference_existing_nodes: bool,
}

/// Sanity rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanityRules {
    /// Flag edges whose source equals destination.
    #[serde(default)]
    pub no_self_edges: bool,
}

/// Graph-wide rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRules {
    /// Referential integrity.
    #[serde(default)]
    pub referential_integrity: ReferentialRules,
    /// Sanity.
    #[serde(default)]
    pub sanity: SanityRules,
}

/// Complete shape document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeSet {
    /// Node shapes.
    #[serde(default)]
    pub node_shapes: Vec<Shape>,
    /// Edge shapes.
    #[serde(default)]
    pub edge_shapes: Vec<Shape>,
    /// Graph-wide rules.
    #[serde(default)]
    pub rules: ShapeRules,
}

/// Shape loading errors.
#[derive(Debug, Error)]
pub enum ShapeError {
    /// File could not be read.
    #[error("shapes io error: {0}")]
    Io(String),
    /// Document did not parse.
    #[error("shapes parse error: {0}")]
    Parse(String),
}

impl Default for ShapeSet {
    /// Built-in shapes: non-empty ids and types, complete edges, no dangling
    /// endpoints, self-loops warned.
    fn default() -> Self {
        let text_field = |path: &str| RequiredField {
            path: path.to_string(),
            value_type: Some("string".to_string()),
            min_len: Some(1),
            constant: None,
            severity: None,
        };
        Self {
            node_shapes: vec![Shape {
                target: Some(ShapeTarget::AllNodes),
                type_name: None,
                attr: None,
                required: vec![text_field("id"), text_field("type")],
                severity: Severity::Error,
            }],
            edge_shapes: vec![Shape {
                target: Some(ShapeTarget::AllEdges),
                type_name: None,
                attr: None,
                required: vec![text_field("src"), text_field("dst"), text_field("type")],
                severity: Severity::Error,
            }],
            rules: ShapeRules {
                referential_integrity: ReferentialRules {
                    edges_must_reference_existing_nodes: true,
                },
                sanity: SanityRules {
                    no_self_edges: true,
                },
            },
        }
    }
}

impl ShapeSet {
    /// Parses a YAML (or JSON) shape document.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::Parse`] when the document is malformed.
    pub fn from_yaml_str(text: &str) -> Result<Self, ShapeError> {
        if text.trim().is_empty() {
            return Ok(Self {
                node_shapes: Vec::new(),
                edge_shapes: Vec::new(),
                rules: ShapeRules::default(),
            });
        }
        serde_yaml::from_str(text).map_err(|err| ShapeError::Parse(err.to_string()))
    }

    /// Loads a shape document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ShapeError> {
        let text = fs::read_to_string(path).map_err(|err| ShapeError::Io(err.to_string()))?;
        Self::from_yaml_str(&text)
    }
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeIssue {
    /// Issue code such as `node_missing` or `edge_dangling_src`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Severity.
    pub severity: Severity,
    /// Node id or edge key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Offending path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Validation report for one graph state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeReport {
    /// True when no issue has error severity.
    pub ok: bool,
    /// Findings in node-then-edge order.
    pub issues: Vec<ShapeIssue>,
    /// Nodes inspected.
    pub nodes_seen: usize,
    /// Edges inspected.
    pub edges_seen: usize,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates `graph` against `shapes`.
#[must_use]
pub fn validate_graph(graph: &KnowledgeGraph, shapes: &ShapeSet) -> ShapeReport {
    let mut issues = Vec::new();
    let node_ids: BTreeSet<&str> = graph.nodes().map(|node| node.id.as_str()).collect();

    for node in graph.nodes() {
        let object = json!({"id": node.id, "type": node.node_type, "attrs": node.attrs});
        for shape in &shapes.node_shapes {
            if shape_applies(shape, ShapeTarget::AllNodes, &node.node_type, &node.attrs) {
                check_required(&node.id, &object, shape, "node", &mut issues);
            }
        }
    }

    for edge in graph.edges() {
        let object = json!({
            "src": edge.src,
            "dst": edge.dst,
            "type": edge.edge_type,
            "attrs": edge.attrs,
        });
        for shape in &shapes.edge_shapes {
            if shape_applies(shape, ShapeTarget::AllEdges, &edge.edge_type, &edge.attrs) {
                check_required(&edge.edge_key, &object, shape, "edge", &mut issues);
            }
        }
        if shapes.rules.referential_integrity.edges_must_reference_existing_nodes {
            if !node_ids.contains(edge.src.as_str()) {
                issues.push(ShapeIssue {
                    code: "edge_dangling_src".to_string(),
                    message: format!("edge src does not exist as node: {}", edge.src),
                    severity: Severity::Error,
                    subject: Some(edge.edge_key.clone()),
                    path: Some("src".to_string()),
                });
            }
            if !node_ids.contains(edge.dst.as_str()) {
                issues.push(ShapeIssue {
                    code: "edge_dangling_dst".to_string(),
                    message: format!("edge dst does not exist as node: {}", edge.dst),
                    severity: Severity::Error,
                    subject: Some(edge.edge_key.clone()),
                    path: Some("dst".to_string()),
                });
            }
        }
        if shapes.rules.sanity.no_self_edges && edge.src == edge.dst {
            issues.push(ShapeIssue {
                code: "edge_self_loop".to_string(),
                message: "self-loop edge (src == dst) is disallowed".to_string(),
                severity: Severity::Warn,
                subject: Some(edge.edge_key.clone()),
                path: None,
            });
        }
    }

    let ok = !issues.iter().any(|issue| issue.severity == Severity::Error);
    ShapeReport {
        ok,
        issues,
        nodes_seen: graph.node_count(),
        edges_seen: graph.edge_count(),
    }
}

/// Returns true when `shape` selects a record with this type and attrs.
fn shape_applies(
    shape: &Shape,
    default_target: ShapeTarget,
    type_name: &str,
    attrs: &Map<String, Value>,
) -> bool {
    match shape.target.unwrap_or(default_target) {
        ShapeTarget::AllNodes => default_target == ShapeTarget::AllNodes,
        ShapeTarget::AllEdges => default_target == ShapeTarget::AllEdges,
        ShapeTarget::NodeType | ShapeTarget::EdgeType => shape
            .type_name
            .as_deref()
            .is_some_and(|want| want.eq_ignore_ascii_case(type_name)),
        ShapeTarget::NodeAttrPresent | ShapeTarget::EdgeAttrPresent => {
            shape.attr.as_deref().is_some_and(|want| attrs.contains_key(want))
        }
    }
}

/// Applies a shape's required-field rules to one record.
fn check_required(
    subject: &str,
    object: &Value,
    shape: &Shape,
    kind: &str,
    issues: &mut Vec<ShapeIssue>,
) {
    for rule in &shape.required {
        let severity = rule.severity.unwrap_or(shape.severity);
        let issue = |code: &str, message: String| ShapeIssue {
            code: format!("{kind}_{code}"),
            message,
            severity,
            subject: Some(subject.to_string()),
            path: Some(rule.path.clone()),
        };
        let value = lookup_path(object, &rule.path);
        let Some(value) = value else {
            issues.push(issue("missing", format!("missing required field: {}", rule.path)));
            continue;
        };
        if let Some(want) = rule.value_type.as_deref()
            && !type_matches(value, want)
        {
            issues.push(issue("bad_type", format!("field {} expected {want}", rule.path)));
            continue;
        }
        if let Some(constant) = &rule.constant
            && value != constant
        {
            issues.push(issue("const", format!("field {} expected const {constant}", rule.path)));
        }
        if let (Some(min_len), Value::String(text)) = (rule.min_len, value)
            && text.chars().count() < min_len
        {
            issues.push(issue("min_len", format!("field {} shorter than {min_len}", rule.path)));
        }
    }
}

/// Walks a dotted path; JSON null counts as absent.
fn lookup_path<'a>(object: &'a Value, dotted: &str) -> Option<&'a Value> {
    if dotted.is_empty() {
        return None;
    }
    let mut current = object;
    for part in dotted.split('.') {
        current = current.as_object()?.get(part)?;
    }
    if current.is_null() { None } else { Some(current) }
}

/// Checks a JSON value against a type name; unknown names pass.
fn type_matches(value: &Value, want: &str) -> bool {
    match want {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}
