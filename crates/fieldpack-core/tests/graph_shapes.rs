// crates/fieldpack-core/tests/graph_shapes.rs
// ============================================================================
// Module: Graph Delta and Shape Tests
// Description: Delta application against the in-memory graph plus shape checks.
// ============================================================================
//! ## Overview
//! Applies JSONL deltas to a [`KnowledgeGraph`] and validates the resulting
//! state with the built-in and document-loaded shape sets.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use fieldpack_core::DeltaError;
use fieldpack_core::GraphDelta;
use fieldpack_core::KnowledgeGraph;
use fieldpack_core::ShapeSet;
use fieldpack_core::core::shacl::Severity;
use fieldpack_core::edge_key;
use fieldpack_core::validate_graph;
use serde_json::Map;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn apply(graph: &mut KnowledgeGraph, text: &str) -> usize {
    GraphDelta::parse(text).unwrap().apply(graph).unwrap()
}

fn codes(graph: &KnowledgeGraph, shapes: &ShapeSet) -> Vec<String> {
    validate_graph(graph, shapes).issues.into_iter().map(|issue| issue.code).collect()
}

// ============================================================================
// SECTION: Delta Application
// ============================================================================

#[test]
fn delta_counts_and_hash_follow_payload() {
    let text = concat!(
        "{\"op\":\"ADD_NODE\",\"id\":\"a\",\"type\":\"Doc\"}\n",
        "\n",
        "{\"op\":\"ADD_NODE\",\"id\":\"b\"}\n",
        "{\"op\":\"ADD_EDGE\",\"src\":\"a\",\"dst\":\"b\",\"rel\":\"CITES\"}\n",
        "{\"op\":\"RENAME\",\"id\":\"a\"}\n",
    );
    let delta = GraphDelta::parse(text).unwrap();
    assert_eq!(delta.ops().len(), 3);
    assert_eq!(delta.new_node_count(), 2);
    assert_eq!(delta.new_edge_count(), 1);
    assert_eq!(delta.hash().len(), 64);

    assert_eq!(delta.ops_count(), 4);

    let padded = GraphDelta::parse(&format!("\n  {}\n\n", text.replace('\n', "  \n"))).unwrap();
    assert_eq!(delta.payload(), padded.payload());
    assert_eq!(delta.hash(), padded.hash());

    let mut graph = KnowledgeGraph::new();
    assert_eq!(delta.apply(&mut graph).unwrap(), 3);
    let edge = graph.edges().next().unwrap();
    assert_eq!(edge.edge_type, "CITES");
}

#[test]
fn malformed_delta_names_the_line() {
    let err = GraphDelta::parse("{\"op\":\"ADD_NODE\",\"id\":\"a\"}\nnot json\n").unwrap_err();
    assert!(matches!(err, DeltaError::Parse { line: 2 }));

    let err = GraphDelta::parse("{\"op\":\"ADD_EDGE\",\"src\":\"a\"}\n").unwrap_err();
    assert!(matches!(err, DeltaError::MissingField { line: 1, .. }));
}

#[test]
fn remove_edge_uses_content_key() {
    let mut graph = KnowledgeGraph::new();
    apply(
        &mut graph,
        concat!(
            "{\"op\":\"ADD_NODE\",\"id\":\"a\",\"type\":\"Doc\"}\n",
            "{\"op\":\"ADD_NODE\",\"id\":\"b\",\"type\":\"Doc\"}\n",
            "{\"op\":\"ADD_EDGE\",\"src\":\"a\",\"dst\":\"b\",\"type\":\"CITES\"}\n",
        ),
    );
    assert_eq!(graph.edge_count(), 1);

    let key = edge_key("a", "b", "CITES", &Map::new()).unwrap();
    apply(&mut graph, &format!("{{\"op\":\"REMOVE_EDGE\",\"edge_key\":\"{key}\"}}\n"));
    assert_eq!(graph.edge_count(), 0);
    assert_eq!(graph.node_count(), 2);
}

// ============================================================================
// SECTION: Shapes
// ============================================================================

#[test]
fn default_shapes_flag_dangling_edges() {
    let mut graph = KnowledgeGraph::new();
    apply(
        &mut graph,
        concat!(
            "{\"op\":\"ADD_NODE\",\"id\":\"a\",\"type\":\"Doc\"}\n",
            "{\"op\":\"ADD_EDGE\",\"src\":\"a\",\"dst\":\"ghost\",\"type\":\"CITES\"}\n",
        ),
    );
    let report = validate_graph(&graph, &ShapeSet::default());
    assert!(!report.ok);
    assert_eq!(report.nodes_seen, 1);
    assert_eq!(report.edges_seen, 1);
    assert_eq!(codes(&graph, &ShapeSet::default()), vec!["edge_dangling_dst".to_string()]);
}

#[test]
fn self_loops_only_warn() {
    let mut graph = KnowledgeGraph::new();
    apply(
        &mut graph,
        concat!(
            "{\"op\":\"ADD_NODE\",\"id\":\"a\",\"type\":\"Doc\"}\n",
            "{\"op\":\"ADD_EDGE\",\"src\":\"a\",\"dst\":\"a\",\"type\":\"SAME\"}\n",
        ),
    );
    let report = validate_graph(&graph, &ShapeSet::default());
    assert!(report.ok);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].code, "edge_self_loop");
    assert_eq!(report.issues[0].severity, Severity::Warn);
}

#[test]
fn document_shapes_check_typed_attributes() {
    let shapes = ShapeSet::from_yaml_str(
        r"
node_shapes:
  - target: NODE_TYPE
    type: doc
    required:
      - path: attrs.title
        type: string
        min_len: 3
      - path: attrs.version
        type: integer
        severity: warn
",
    )
    .unwrap();
    let mut graph = KnowledgeGraph::new();
    apply(
        &mut graph,
        concat!(
            "{\"op\":\"ADD_NODE\",\"id\":\"a\",\"type\":\"Doc\",\"attrs\":{\"title\":\"ok!\",\"version\":2}}\n",
            "{\"op\":\"ADD_NODE\",\"id\":\"b\",\"type\":\"Doc\",\"attrs\":{\"title\":\"x\",\"version\":\"2\"}}\n",
            "{\"op\":\"ADD_NODE\",\"id\":\"c\",\"type\":\"Person\"}\n",
        ),
    );
    let report = validate_graph(&graph, &shapes);
    assert!(!report.ok);
    let found: Vec<(&str, Option<&str>)> = report
        .issues
        .iter()
        .map(|issue| (issue.code.as_str(), issue.subject.as_deref()))
        .collect();
    assert_eq!(found, vec![("node_min_len", Some("b")), ("node_bad_type", Some("b"))]);
    assert_eq!(report.issues[1].severity, Severity::Warn);
}

#[test]
fn empty_shape_document_accepts_anything() {
    let shapes = ShapeSet::from_yaml_str("  \n").unwrap();
    let mut graph = KnowledgeGraph::new();
    apply(&mut graph, "{\"op\":\"ADD_EDGE\",\"src\":\"x\",\"dst\":\"y\",\"type\":\"T\"}\n");
    assert!(validate_graph(&graph, &shapes).ok);
}
