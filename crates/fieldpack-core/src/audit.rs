// crates/fieldpack-core/src/audit.rs
// ============================================================================
// Module: Fieldpack Audit Logging
// Description: Structured audit events for sealing, verification, and acceptance.
// Purpose: Emit JSON-line audit records without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events describe what happened to a bundle: sealed, verified,
//! offered for acceptance, reviewed, or replayed. Sinks serialize each event
//! as one JSON line. Audit timestamps are wall-clock and never feed a hash.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Bundle sealing audit event.
#[derive(Debug, Clone, Serialize)]
pub struct BundleSealedEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Producer identity.
    pub toolchain_id: String,
    /// Bundle label.
    pub label: String,
    /// Final archive path.
    pub bundle_path: String,
    /// Hash of the sealed file map.
    pub bundle_map_hash: String,
    /// Number of archive entries.
    pub entry_count: usize,
    /// Whether the attestation was signed.
    pub signed: bool,
}

/// Bundle verification audit event.
#[derive(Debug, Clone, Serialize)]
pub struct BundleVerifiedEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Archive path.
    pub bundle_path: String,
    /// Verification outcome.
    pub ok: bool,
    /// Verifier reason.
    pub reason: String,
    /// Claimed producer identity when parsed.
    pub toolchain_id: Option<String>,
}

/// Bundle acceptance audit event.
#[derive(Debug, Clone, Serialize)]
pub struct BundleAcceptEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Archive path.
    pub bundle_path: String,
    /// SHA-256 of the archive bytes when read.
    pub bundle_sha256: Option<String>,
    /// Effective acceptance mode when resolved.
    pub mode: Option<String>,
    /// Disposition label, or `REFUSED`.
    pub status: String,
    /// Refusal or quarantine reason.
    pub reason: Option<String>,
    /// Staged row id when staged.
    pub staged_id: Option<i64>,
    /// Delta operation count when parsed.
    pub ops_count: Option<usize>,
}

/// Staged review audit event.
#[derive(Debug, Clone, Serialize)]
pub struct StagedReviewEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Staged row id.
    pub staged_id: i64,
    /// Requested decision (`APPROVED` or `REJECTED`).
    pub decision: String,
    /// Reviewing actor.
    pub actor: String,
    /// Whether the decision was recorded.
    pub ok: bool,
    /// Refusal reason when not recorded.
    pub reason: Option<String>,
}

/// Replay verification audit event.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayVerifyEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Whether the replayed snapshot matched the live graph.
    pub snapshot_match: bool,
    /// Whether every ledger chain re-verified.
    pub chains_ok: bool,
    /// Number of replayed delta rows.
    pub deltas_count: usize,
}

/// Inputs required to construct a sealing audit event.
pub struct BundleSealedEventParams {
    /// Producer identity.
    pub toolchain_id: String,
    /// Bundle label.
    pub label: String,
    /// Final archive path.
    pub bundle_path: String,
    /// Hash of the sealed file map.
    pub bundle_map_hash: String,
    /// Number of archive entries.
    pub entry_count: usize,
    /// Whether the attestation was signed.
    pub signed: bool,
}

/// Inputs required to construct a verification audit event.
pub struct BundleVerifiedEventParams {
    /// Archive path.
    pub bundle_path: String,
    /// Verification outcome.
    pub ok: bool,
    /// Verifier reason.
    pub reason: String,
    /// Claimed producer identity when parsed.
    pub toolchain_id: Option<String>,
}

/// Inputs required to construct an acceptance audit event.
pub struct BundleAcceptEventParams {
    /// Archive path.
    pub bundle_path: String,
    /// SHA-256 of the archive bytes when read.
    pub bundle_sha256: Option<String>,
    /// Effective acceptance mode when resolved.
    pub mode: Option<String>,
    /// Disposition label, or `REFUSED`.
    pub status: String,
    /// Refusal or quarantine reason.
    pub reason: Option<String>,
    /// Staged row id when staged.
    pub staged_id: Option<i64>,
    /// Delta operation count when parsed.
    pub ops_count: Option<usize>,
}

/// Inputs required to construct a review audit event.
pub struct StagedReviewEventParams {
    /// Staged row id.
    pub staged_id: i64,
    /// Requested decision.
    pub decision: String,
    /// Reviewing actor.
    pub actor: String,
    /// Whether the decision was recorded.
    pub ok: bool,
    /// Refusal reason when not recorded.
    pub reason: Option<String>,
}

/// Inputs required to construct a replay audit event.
pub struct ReplayVerifyEventParams {
    /// Whether the replayed snapshot matched the live graph.
    pub snapshot_match: bool,
    /// Whether every ledger chain re-verified.
    pub chains_ok: bool,
    /// Number of replayed delta rows.
    pub deltas_count: usize,
}

/// Milliseconds since the unix epoch for audit records.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

impl BundleSealedEvent {
    /// Creates a new sealing event with a consistent timestamp.
    #[must_use]
    pub fn new(params: BundleSealedEventParams) -> Self {
        Self {
            event: "bundle_sealed",
            timestamp_ms: now_ms(),
            toolchain_id: params.toolchain_id,
            label: params.label,
            bundle_path: params.bundle_path,
            bundle_map_hash: params.bundle_map_hash,
            entry_count: params.entry_count,
            signed: params.signed,
        }
    }
}

impl BundleVerifiedEvent {
    /// Creates a new verification event with a consistent timestamp.
    #[must_use]
    pub fn new(params: BundleVerifiedEventParams) -> Self {
        Self {
            event: "bundle_verified",
            timestamp_ms: now_ms(),
            bundle_path: params.bundle_path,
            ok: params.ok,
            reason: params.reason,
            toolchain_id: params.toolchain_id,
        }
    }
}

impl BundleAcceptEvent {
    /// Creates a new acceptance event with a consistent timestamp.
    #[must_use]
    pub fn new(params: BundleAcceptEventParams) -> Self {
        Self {
            event: "bundle_accept",
            timestamp_ms: now_ms(),
            bundle_path: params.bundle_path,
            bundle_sha256: params.bundle_sha256,
            mode: params.mode,
            status: params.status,
            reason: params.reason,
            staged_id: params.staged_id,
            ops_count: params.ops_count,
        }
    }
}

impl StagedReviewEvent {
    /// Creates a new review event with a consistent timestamp.
    #[must_use]
    pub fn new(params: StagedReviewEventParams) -> Self {
        Self {
            event: "staged_review",
            timestamp_ms: now_ms(),
            staged_id: params.staged_id,
            decision: params.decision,
            actor: params.actor,
            ok: params.ok,
            reason: params.reason,
        }
    }
}

impl ReplayVerifyEvent {
    /// Creates a new replay event with a consistent timestamp.
    #[must_use]
    pub fn new(params: ReplayVerifyEventParams) -> Self {
        Self {
            event: "replay_verify",
            timestamp_ms: now_ms(),
            snapshot_match: params.snapshot_match,
            chains_ok: params.chains_ok,
            deltas_count: params.deltas_count,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for bundle lifecycle events.
pub trait FieldpackAuditSink: Send + Sync {
    /// Record a sealing event.
    fn record_sealed(&self, event: &BundleSealedEvent);

    /// Record a verification event.
    fn record_verified(&self, _event: &BundleVerifiedEvent) {}

    /// Record an acceptance event.
    fn record_accept(&self, _event: &BundleAcceptEvent) {}

    /// Record a staged review event.
    fn record_review(&self, _event: &StagedReviewEvent) {}

    /// Record a replay verification event.
    fn record_replay(&self, _event: &ReplayVerifyEvent) {}
}

/// Writes one serialized event to stderr.
fn emit_stderr<T: Serialize>(event: &T) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = writeln!(std::io::stderr(), "{payload}");
    }
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl FieldpackAuditSink for StderrAuditSink {
    fn record_sealed(&self, event: &BundleSealedEvent) {
        emit_stderr(event);
    }

    fn record_verified(&self, event: &BundleVerifiedEvent) {
        emit_stderr(event);
    }

    fn record_accept(&self, event: &BundleAcceptEvent) {
        emit_stderr(event);
    }

    fn record_review(&self, event: &StagedReviewEvent) {
        emit_stderr(event);
    }

    fn record_replay(&self, event: &ReplayVerifyEvent) {
        emit_stderr(event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event.
    fn emit<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl FieldpackAuditSink for FileAuditSink {
    fn record_sealed(&self, event: &BundleSealedEvent) {
        self.emit(event);
    }

    fn record_verified(&self, event: &BundleVerifiedEvent) {
        self.emit(event);
    }

    fn record_accept(&self, event: &BundleAcceptEvent) {
        self.emit(event);
    }

    fn record_review(&self, event: &StagedReviewEvent) {
        self.emit(event);
    }

    fn record_replay(&self, event: &ReplayVerifyEvent) {
        self.emit(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl FieldpackAuditSink for NoopAuditSink {
    fn record_sealed(&self, _event: &BundleSealedEvent) {}
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

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FileAuditSink::new(&path).unwrap();
        sink.record_verified(&BundleVerifiedEvent::new(BundleVerifiedEventParams {
            bundle_path: "b.tar".to_string(),
            ok: false,
            reason: "missing_manifest".to_string(),
            toolchain_id: None,
        }));
        sink.record_replay(&ReplayVerifyEvent::new(ReplayVerifyEventParams {
            snapshot_match: true,
            chains_ok: true,
            deltas_count: 2,
        }));
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "bundle_verified");
        assert_eq!(first["reason"], "missing_manifest");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "replay_verify");
    }
}
