// crates/fieldpack-store-sqlite/src/graph_ledger.rs
// ============================================================================
// Module: Graph Delta Ledger File
// Description: Hash-chained JSONL log of every committed graph mutation batch.
// Purpose: Provide an out-of-database audit trail that replay can re-walk.
// Dependencies: fieldpack-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each committed merge or approval appends one event to the ledger file:
//! `{v, kind, prev_hash, payload, event_hash}` where `event_hash` chains the
//! event body to the previous event's hash. The file is only ever appended;
//! [`verify_ledger_chain`] recomputes every hash and reports the first break.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use fieldpack_core::GraphDelta;
use fieldpack_core::HashError;
use fieldpack_core::chain_hash;
use fieldpack_core::core::hashing::canonical_json_line;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Event format version.
pub const GRAPH_LEDGER_VERSION: u32 = 1;
/// Event kind label.
pub const GRAPH_LEDGER_KIND: &str = "graph_delta";
/// Default ledger file name next to the database.
pub const DEFAULT_GRAPH_LEDGER_FILE: &str = "graph_delta_ledger.jsonl";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Graph ledger failures.
#[derive(Debug, Error)]
pub enum GraphLedgerError {
    /// File could not be read or written.
    #[error("graph ledger io error: {0}")]
    Io(String),
    /// A line is not a ledger event.
    #[error("graph ledger line {0} is malformed")]
    Malformed(usize),
    /// Event could not be canonicalized.
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLedgerPayload {
    /// Origin of the batch (for example `BUNDLE_IMPORT`).
    pub source: String,
    /// Canonical delta payload.
    pub ops_payload: String,
    /// SHA-256 of `ops_payload`.
    pub ops_hash: String,
    /// Free-form context such as bundle digest and ledger row ids.
    pub meta: Value,
}

/// Hashed portion of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLedgerBody {
    /// Format version.
    pub v: u32,
    /// Event kind.
    pub kind: String,
    /// Previous event hash.
    pub prev_hash: Option<String>,
    /// Payload.
    pub payload: GraphLedgerPayload,
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLedgerEvent {
    /// Hashed body.
    #[serde(flatten)]
    pub body: GraphLedgerBody,
    /// Hash of this event.
    pub event_hash: String,
}

/// Result of re-walking a ledger file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphLedgerStatus {
    /// True when every event links and hashes correctly.
    pub ok: bool,
    /// Events read (including the first broken one).
    pub events: usize,
}

// ============================================================================
// SECTION: Append
// ============================================================================

/// Appends one event for an applied delta and returns it.
///
/// # Errors
///
/// Returns [`GraphLedgerError`] when the existing file is malformed or the
/// append fails.
pub fn append_graph_delta_event(
    path: &Path,
    source: &str,
    delta: &GraphDelta,
    meta: Value,
) -> Result<GraphLedgerEvent, GraphLedgerError> {
    let prev_hash = latest_event_hash(path)?;
    let body = GraphLedgerBody {
        v: GRAPH_LEDGER_VERSION,
        kind: GRAPH_LEDGER_KIND.to_string(),
        prev_hash,
        payload: GraphLedgerPayload {
            source: source.to_string(),
            ops_payload: delta.payload().to_string(),
            ops_hash: delta.hash(),
            meta,
        },
    };
    let event_hash = chain_hash(body.prev_hash.as_deref(), &body)?;
    let event = GraphLedgerEvent {
        body,
        event_hash,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| GraphLedgerError::Io(err.to_string()))?;
    }
    let line = canonical_json_line(&event)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| GraphLedgerError::Io(err.to_string()))?;
    file.write_all(&line).map_err(|err| GraphLedgerError::Io(err.to_string()))?;
    file.sync_all().map_err(|err| GraphLedgerError::Io(err.to_string()))?;
    Ok(event)
}

/// Hash of the newest event, or `None` for a missing or empty file.
///
/// # Errors
///
/// Returns [`GraphLedgerError`] when the file is unreadable or its last line
/// is malformed.
pub fn latest_event_hash(path: &Path) -> Result<Option<String>, GraphLedgerError> {
    let events = read_events(path)?;
    Ok(events.last().map(|event| event.event_hash.clone()))
}

// ============================================================================
// SECTION: Read and Verify
// ============================================================================

/// Reads every event in file order.
///
/// # Errors
///
/// Returns [`GraphLedgerError::Malformed`] naming the first undecodable line.
pub fn read_events(path: &Path) -> Result<Vec<GraphLedgerEvent>, GraphLedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).map_err(|err| GraphLedgerError::Io(err.to_string()))?;
    let mut events = Vec::new();
    for (index, line) in text.lines().filter(|line| !line.trim().is_empty()).enumerate() {
        let event: GraphLedgerEvent =
            serde_json::from_str(line).map_err(|_| GraphLedgerError::Malformed(index + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// Re-walks the ledger file's hash chain.
///
/// A missing file is an empty, intact ledger.
///
/// # Errors
///
/// Returns [`GraphLedgerError`] when the file is unreadable or a line does
/// not decode.
pub fn verify_ledger_chain(path: &Path) -> Result<GraphLedgerStatus, GraphLedgerError> {
    let mut prev: Option<String> = None;
    let mut events = 0;
    for event in read_events(path)? {
        events += 1;
        let body = &event.body;
        let linked = body.v == GRAPH_LEDGER_VERSION
            && body.kind == GRAPH_LEDGER_KIND
            && body.prev_hash == prev;
        if !linked || chain_hash(prev.as_deref(), body)? != event.event_hash {
            return Ok(GraphLedgerStatus {
                ok: false,
                events,
            });
        }
        prev = Some(event.event_hash);
    }
    Ok(GraphLedgerStatus {
        ok: true,
        events,
    })
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

    #[test]
    fn appended_events_chain_and_edits_break_it() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger").join(DEFAULT_GRAPH_LEDGER_FILE);
        assert_eq!(verify_ledger_chain(&path).unwrap(), GraphLedgerStatus { ok: true, events: 0 });

        let first = GraphDelta::parse("{\"op\":\"ADD_NODE\",\"id\":\"a\"}\n").unwrap();
        let second = GraphDelta::parse("{\"op\":\"ADD_NODE\",\"id\":\"b\"}\n").unwrap();
        let one = append_graph_delta_event(&path, "BUNDLE_IMPORT", &first, json!({"n": 1})).unwrap();
        let two = append_graph_delta_event(&path, "BUNDLE_IMPORT", &second, json!(null)).unwrap();
        assert_eq!(two.body.prev_hash.as_deref(), Some(one.event_hash.as_str()));
        assert_eq!(verify_ledger_chain(&path).unwrap(), GraphLedgerStatus { ok: true, events: 2 });

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("\"n\":1", "\"n\":2")).unwrap();
        assert_eq!(verify_ledger_chain(&path).unwrap(), GraphLedgerStatus { ok: false, events: 1 });
    }
}
