// crates/fieldpack-core/src/core/provenance.rs
// ============================================================================
// Module: Fieldpack Provenance Chain
// Description: Hash-chained producer event log carried as provenance.jsonl.
// Purpose: Let consumers detect edits to the producer's recorded history.
// Dependencies: crate::core::hashing, serde, serde_json
// ============================================================================

//! ## Overview
//! Each provenance event stores the previous event's hash and its own
//! `event_hash = sha256(canonical({prev_hash, event_type, payload}))`. The log
//! is serialized as canonical JSON lines. [`verify_chain`] re-walks a log and
//! reports the first line whose hash or back-link does not match.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::HashError;
use crate::core::hashing::canonical_json_line;
use crate::core::hashing::canonical_sha256_hex;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One provenance event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEvent {
    /// Event type label.
    pub event_type: String,
    /// Event payload.
    pub payload: Value,
    /// Hash of the previous event.
    pub prev_hash: Option<String>,
    /// Hash of this event.
    pub event_hash: String,
}

/// Hashed portion of an event.
#[derive(Serialize)]
struct EventBody<'a> {
    /// Previous event hash.
    prev_hash: Option<&'a str>,
    /// Event type label.
    event_type: &'a str,
    /// Event payload.
    payload: &'a Value,
}

/// Provenance chain errors.
#[derive(Debug, Error)]
pub enum ProvenanceError {
    /// Line is not a provenance event.
    #[error("provenance line {line} is malformed")]
    Malformed {
        /// 1-based line.
        line: usize,
    },
    /// Line's hash or back-link does not match.
    #[error("provenance chain broken at line {line}")]
    Broken {
        /// 1-based line.
        line: usize,
    },
    /// Canonicalization failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Computes an event hash.
///
/// # Errors
///
/// Returns [`HashError`] when the payload cannot be canonicalized.
pub fn event_hash(
    prev_hash: Option<&str>,
    event_type: &str,
    payload: &Value,
) -> Result<String, HashError> {
    canonical_sha256_hex(&EventBody {
        prev_hash,
        event_type,
        payload,
    })
}

// ============================================================================
// SECTION: Log Builder
// ============================================================================

/// In-memory provenance log under construction.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceLog {
    /// Events in append order.
    events: Vec<ProvenanceEvent>,
}

impl ProvenanceLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event linked to the current head.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the payload cannot be canonicalized.
    pub fn append(
        &mut self,
        event_type: &str,
        payload: Value,
    ) -> Result<&ProvenanceEvent, HashError> {
        let prev_hash = self.events.last().map(|event| event.event_hash.clone());
        let hash = event_hash(prev_hash.as_deref(), event_type, &payload)?;
        self.events.push(ProvenanceEvent {
            event_type: event_type.to_string(),
            payload,
            prev_hash,
            event_hash: hash,
        });
        let index = self.events.len() - 1;
        Ok(&self.events[index])
    }

    /// Events in order.
    #[must_use]
    pub fn events(&self) -> &[ProvenanceEvent] {
        &self.events
    }

    /// Serializes the log as canonical JSON lines.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when an event cannot be canonicalized.
    pub fn to_jsonl(&self) -> Result<String, HashError> {
        let mut out = Vec::new();
        for event in &self.events {
            out.extend(canonical_json_line(event)?);
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies a provenance JSONL log and returns the event count.
///
/// # Errors
///
/// Returns [`ProvenanceError`] naming the first malformed or broken line.
pub fn verify_chain(text: &str) -> Result<usize, ProvenanceError> {
    let mut prev: Option<String> = None;
    let mut count = 0;
    for (index, line) in text.lines().map(str::trim).filter(|line| !line.is_empty()).enumerate() {
        let line_no = index + 1;
        let event: ProvenanceEvent = serde_json::from_str(line).map_err(|_| {
            ProvenanceError::Malformed {
                line: line_no,
            }
        })?;
        if event.prev_hash != prev {
            return Err(ProvenanceError::Broken {
                line: line_no,
            });
        }
        let expected = event_hash(prev.as_deref(), &event.event_type, &event.payload)?;
        if expected != event.event_hash {
            return Err(ProvenanceError::Broken {
                line: line_no,
            });
        }
        prev = Some(event.event_hash);
        count += 1;
    }
    Ok(count)
}
