// crates/fieldpack-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Graph and Ledger Store
// Description: Live knowledge graph plus append-only, hash-chained ledgers.
// Purpose: Keep graph mutations and their ledger rows in one transactional store.
// Dependencies: fieldpack-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One `SQLite` database holds the live graph (`nodes`, `edges`) and four
//! ledger tables (`kg_deltas`, `ingested_bundles`, `staged_bundles`,
//! `staged_decisions`). Ledger rows are immutable: `BEFORE UPDATE` and
//! `BEFORE DELETE` triggers abort any attempt to change them, and every row
//! stores `row_hash = digest(prev_row_hash ∥ canonical(record))` so an edit
//! made by bypassing the triggers still shows up as a broken chain.
//!
//! Writes go through [`FieldpackStore::write`], which runs a closure inside a
//! single immediate transaction and commits only when the closure succeeds.
//! Security posture: database contents are untrusted on read; chain checks
//! recompute every hash rather than trusting stored values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use fieldpack_core::GraphEdge;
use fieldpack_core::GraphMutationError;
use fieldpack_core::GraphMutator;
use fieldpack_core::GraphNode;
use fieldpack_core::HashError;
use fieldpack_core::KnowledgeGraph;
use fieldpack_core::canonical_json_bytes;
use fieldpack_core::chain_hash;
use fieldpack_core::edge_key;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Type;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Configuration with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Default busy timeout for serde.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding delta payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data could not be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// A unique ledger key already exists.
    #[error("sqlite store duplicate key: {0}")]
    Duplicate(String),
    /// An append-only ledger row was targeted by an update or delete.
    #[error("sqlite store append-only violation: {0}")]
    AppendOnly(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, message) = &err
            && code.code == ErrorCode::ConstraintViolation
        {
            let message = message.clone().unwrap_or_else(|| err.to_string());
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                return Self::Duplicate(message);
            }
            if message.contains("append-only") {
                return Self::AppendOnly(message);
            }
        }
        Self::Db(err.to_string())
    }
}

impl From<HashError> for SqliteStoreError {
    fn from(err: HashError) -> Self {
        Self::Invalid(err.to_string())
    }
}

impl From<SqliteStoreError> for GraphMutationError {
    fn from(err: SqliteStoreError) -> Self {
        Self(err.to_string())
    }
}

// ============================================================================
// SECTION: Ledger Records
// ============================================================================

/// Ledger tables in chain-verification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerTable {
    /// Applied delta batches.
    KgDeltas,
    /// Merged bundles, unique on archive digest.
    IngestedBundles,
    /// Bundles parked for review.
    StagedBundles,
    /// Terminal review decisions, unique on staged id.
    StagedDecisions,
}

impl LedgerTable {
    /// Every ledger table.
    pub const ALL: [Self; 4] =
        [Self::KgDeltas, Self::IngestedBundles, Self::StagedBundles, Self::StagedDecisions];

    /// Table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::KgDeltas => "kg_deltas",
            Self::IngestedBundles => "ingested_bundles",
            Self::StagedBundles => "staged_bundles",
            Self::StagedDecisions => "staged_decisions",
        }
    }
}

/// Staged bundle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StagedStatus {
    /// Awaiting review.
    Pending,
    /// Held back; review still possible.
    Quarantined,
    /// Applied by a reviewer.
    Approved,
    /// Refused by a reviewer.
    Rejected,
}

impl StagedStatus {
    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Quarantined => "QUARANTINED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// True while a review decision is still allowed.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Quarantined)
    }
}

impl fmt::Display for StagedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StagedStatus {
    type Err = SqliteStoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "QUARANTINED" => Ok(Self::Quarantined),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(SqliteStoreError::Invalid(format!("unknown staged status: {other}"))),
        }
    }
}

/// A record type stored in one ledger table.
///
/// Column order in [`LedgerRecord::COLUMNS`] matches both
/// [`LedgerRecord::values`] and [`LedgerRecord::from_row`].
pub trait LedgerRecord: Serialize + Sized {
    /// Backing table.
    const TABLE: LedgerTable;
    /// Content columns, excluding `id`, `prev_hash`, and `row_hash`.
    const COLUMNS: &'static [&'static str];

    /// Column values in [`LedgerRecord::COLUMNS`] order.
    fn values(&self) -> Vec<SqlValue>;

    /// Decodes content columns starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`rusqlite::Error`] when a column has the wrong type.
    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self>;
}

/// One applied delta batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KgDeltaRecord {
    /// Commit time (RFC 3339).
    pub ts_utc: String,
    /// Producer of the batch.
    pub source: String,
    /// `BUNDLE_IMPORT` or `BUNDLE_APPROVE`.
    pub delta_kind: String,
    /// Canonical delta payload.
    pub delta_payload: String,
    /// SHA-256 of the payload.
    pub delta_hash: String,
}

/// One merged bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestedRecord {
    /// Commit time (RFC 3339).
    pub ts_utc: String,
    /// SHA-256 of the archive bytes.
    pub bundle_sha256: String,
    /// Archive file name.
    pub bundle_name: String,
    /// Verifier reason at acceptance.
    pub verify_reason: String,
    /// Local policy id.
    pub policy_id: String,
    /// Local policy hash.
    pub policy_hash: String,
    /// Local allowlist hash.
    pub allowlist_hash: String,
    /// Producer toolchain id.
    pub toolchain_id: String,
    /// Bundle map hash.
    pub bundle_map_hash: String,
    /// Delta line count.
    pub ops_count: i64,
    /// Delta payload hash.
    pub kg_delta_hash: String,
    /// Always `MERGED`.
    pub ingest_kind: String,
    /// Operator notes.
    pub notes: Option<String>,
}

/// One staged bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedRecord {
    /// Staging time (RFC 3339).
    pub ts_utc: String,
    /// SHA-256 of the archive bytes.
    pub bundle_sha256: String,
    /// Archive file name.
    pub bundle_name: String,
    /// Verifier reason, with any acceptance note appended.
    pub verify_reason: String,
    /// Local policy id.
    pub policy_id: String,
    /// Local policy hash.
    pub policy_hash: String,
    /// Local allowlist hash.
    pub allowlist_hash: String,
    /// Producer toolchain id.
    pub toolchain_id: String,
    /// Bundle map hash.
    pub bundle_map_hash: String,
    /// Delta line count.
    pub ops_count: i64,
    /// Canonical delta payload kept for later approval.
    pub kg_delta_payload: String,
    /// Delta payload hash.
    pub kg_delta_hash: String,
    /// Status at staging time.
    pub status: StagedStatus,
    /// Effective acceptance mode.
    pub policy_mode: String,
    /// Contract validation report (JSON).
    pub contracts_report_json: String,
    /// Shape validation report (JSON).
    pub kg_shacl_report_json: String,
    /// Actor recorded at staging, if any.
    pub actor: Option<String>,
    /// Notes recorded at staging, if any.
    pub notes: Option<String>,
}

/// One terminal review decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Decision time (RFC 3339).
    pub ts_utc: String,
    /// Staged row decided.
    pub staged_id: i64,
    /// `APPROVED` or `REJECTED`.
    pub decision: StagedStatus,
    /// Reviewer.
    pub actor: String,
    /// Reviewer notes.
    pub notes: Option<String>,
}

/// A stored ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRow<R> {
    /// Row id (insertion order).
    pub id: i64,
    /// Row content.
    pub record: R,
    /// Hash of the previous row in the same table.
    pub prev_hash: Option<String>,
    /// Hash of this row.
    pub row_hash: String,
}

/// Wraps an optional string as a SQL value.
fn opt_text(value: Option<&String>) -> SqlValue {
    value.map_or(SqlValue::Null, |text| SqlValue::Text(text.clone()))
}

/// Decodes a status column.
fn status_at(row: &Row<'_>, index: usize) -> rusqlite::Result<StagedStatus> {
    let text: String = row.get(index)?;
    text.parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

impl LedgerRecord for KgDeltaRecord {
    const TABLE: LedgerTable = LedgerTable::KgDeltas;
    const COLUMNS: &'static [&'static str] =
        &["ts_utc", "source", "delta_kind", "delta_payload", "delta_hash"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.ts_utc.clone()),
            SqlValue::Text(self.source.clone()),
            SqlValue::Text(self.delta_kind.clone()),
            SqlValue::Text(self.delta_payload.clone()),
            SqlValue::Text(self.delta_hash.clone()),
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            ts_utc: row.get(offset)?,
            source: row.get(offset + 1)?,
            delta_kind: row.get(offset + 2)?,
            delta_payload: row.get(offset + 3)?,
            delta_hash: row.get(offset + 4)?,
        })
    }
}

impl LedgerRecord for IngestedRecord {
    const TABLE: LedgerTable = LedgerTable::IngestedBundles;
    const COLUMNS: &'static [&'static str] = &[
        "ts_utc",
        "bundle_sha256",
        "bundle_name",
        "verify_reason",
        "policy_id",
        "policy_hash",
        "allowlist_hash",
        "toolchain_id",
        "bundle_map_hash",
        "ops_count",
        "kg_delta_hash",
        "ingest_kind",
        "notes",
    ];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.ts_utc.clone()),
            SqlValue::Text(self.bundle_sha256.clone()),
            SqlValue::Text(self.bundle_name.clone()),
            SqlValue::Text(self.verify_reason.clone()),
            SqlValue::Text(self.policy_id.clone()),
            SqlValue::Text(self.policy_hash.clone()),
            SqlValue::Text(self.allowlist_hash.clone()),
            SqlValue::Text(self.toolchain_id.clone()),
            SqlValue::Text(self.bundle_map_hash.clone()),
            SqlValue::Integer(self.ops_count),
            SqlValue::Text(self.kg_delta_hash.clone()),
            SqlValue::Text(self.ingest_kind.clone()),
            opt_text(self.notes.as_ref()),
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            ts_utc: row.get(offset)?,
            bundle_sha256: row.get(offset + 1)?,
            bundle_name: row.get(offset + 2)?,
            verify_reason: row.get(offset + 3)?,
            policy_id: row.get(offset + 4)?,
            policy_hash: row.get(offset + 5)?,
            allowlist_hash: row.get(offset + 6)?,
            toolchain_id: row.get(offset + 7)?,
            bundle_map_hash: row.get(offset + 8)?,
            ops_count: row.get(offset + 9)?,
            kg_delta_hash: row.get(offset + 10)?,
            ingest_kind: row.get(offset + 11)?,
            notes: row.get(offset + 12)?,
        })
    }
}

impl LedgerRecord for StagedRecord {
    const TABLE: LedgerTable = LedgerTable::StagedBundles;
    const COLUMNS: &'static [&'static str] = &[
        "ts_utc",
        "bundle_sha256",
        "bundle_name",
        "verify_reason",
        "policy_id",
        "policy_hash",
        "allowlist_hash",
        "toolchain_id",
        "bundle_map_hash",
        "ops_count",
        "kg_delta_payload",
        "kg_delta_hash",
        "status",
        "policy_mode",
        "contracts_report_json",
        "kg_shacl_report_json",
        "actor",
        "notes",
    ];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.ts_utc.clone()),
            SqlValue::Text(self.bundle_sha256.clone()),
            SqlValue::Text(self.bundle_name.clone()),
            SqlValue::Text(self.verify_reason.clone()),
            SqlValue::Text(self.policy_id.clone()),
            SqlValue::Text(self.policy_hash.clone()),
            SqlValue::Text(self.allowlist_hash.clone()),
            SqlValue::Text(self.toolchain_id.clone()),
            SqlValue::Text(self.bundle_map_hash.clone()),
            SqlValue::Integer(self.ops_count),
            SqlValue::Text(self.kg_delta_payload.clone()),
            SqlValue::Text(self.kg_delta_hash.clone()),
            SqlValue::Text(self.status.as_str().to_string()),
            SqlValue::Text(self.policy_mode.clone()),
            SqlValue::Text(self.contracts_report_json.clone()),
            SqlValue::Text(self.kg_shacl_report_json.clone()),
            opt_text(self.actor.as_ref()),
            opt_text(self.notes.as_ref()),
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            ts_utc: row.get(offset)?,
            bundle_sha256: row.get(offset + 1)?,
            bundle_name: row.get(offset + 2)?,
            verify_reason: row.get(offset + 3)?,
            policy_id: row.get(offset + 4)?,
            policy_hash: row.get(offset + 5)?,
            allowlist_hash: row.get(offset + 6)?,
            toolchain_id: row.get(offset + 7)?,
            bundle_map_hash: row.get(offset + 8)?,
            ops_count: row.get(offset + 9)?,
            kg_delta_payload: row.get(offset + 10)?,
            kg_delta_hash: row.get(offset + 11)?,
            status: status_at(row, offset + 12)?,
            policy_mode: row.get(offset + 13)?,
            contracts_report_json: row.get(offset + 14)?,
            kg_shacl_report_json: row.get(offset + 15)?,
            actor: row.get(offset + 16)?,
            notes: row.get(offset + 17)?,
        })
    }
}

impl LedgerRecord for DecisionRecord {
    const TABLE: LedgerTable = LedgerTable::StagedDecisions;
    const COLUMNS: &'static [&'static str] = &["ts_utc", "staged_id", "decision", "actor", "notes"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.ts_utc.clone()),
            SqlValue::Integer(self.staged_id),
            SqlValue::Text(self.decision.as_str().to_string()),
            SqlValue::Text(self.actor.clone()),
            opt_text(self.notes.as_ref()),
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            ts_utc: row.get(offset)?,
            staged_id: row.get(offset + 1)?,
            decision: status_at(row, offset + 2)?,
            actor: row.get(offset + 3)?,
            notes: row.get(offset + 4)?,
        })
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Row counts across the ledger tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerCounts {
    /// `kg_deltas` rows.
    pub kg_deltas: u64,
    /// `ingested_bundles` rows.
    pub ingested_bundles: u64,
    /// `staged_bundles` rows.
    pub staged_bundles: u64,
    /// `staged_decisions` rows.
    pub staged_decisions: u64,
}

/// A staged row with its effective status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedEntry {
    /// Stored staged row.
    pub row: LedgerRow<StagedRecord>,
    /// Decision status when decided, otherwise the staging status.
    pub effective_status: StagedStatus,
    /// Terminal decision, if any.
    pub decision: Option<DecisionRecord>,
}

/// `SQLite`-backed graph and ledger store.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - Ledger tables reject updates and deletes at the storage layer.
#[derive(Clone)]
pub struct FieldpackStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl FieldpackStore {
    /// Opens (and initializes) the store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Runs `f` inside one immediate write transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back otherwise,
    /// so no partial mutation is ever visible.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a store error when the transaction
    /// cannot be opened or committed.
    pub fn write<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<SqliteStoreError>,
    {
        let mut guard = self.lock()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(SqliteStoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(SqliteStoreError::from)?;
        Ok(value)
    }

    /// Runs `f` against the connection without a write transaction.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a store error when the lock is poisoned.
    pub fn read<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<SqliteStoreError>,
    {
        let guard = self.lock()?;
        f(&guard)
    }

    /// Loads the live graph.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when rows cannot be read or decoded.
    pub fn load_graph(&self) -> Result<KnowledgeGraph, SqliteStoreError> {
        self.read(load_graph)
    }

    /// Row counts across the ledger tables.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when a count query fails.
    pub fn ledger_counts(&self) -> Result<LedgerCounts, SqliteStoreError> {
        self.read(ledger_counts)
    }

    /// Lists staged rows newest first, optionally filtered by effective status.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when rows cannot be read.
    pub fn list_staged(
        &self,
        status: Option<StagedStatus>,
    ) -> Result<Vec<StagedEntry>, SqliteStoreError> {
        self.read(|conn| list_staged(conn, status))
    }

    /// Acquires the connection lock.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Ledger Access
// ============================================================================

/// Column list used when selecting a full ledger row.
fn select_columns<R: LedgerRecord>() -> String {
    format!("id, {}, prev_hash, row_hash", R::COLUMNS.join(", "))
}

/// Decodes a full ledger row selected with [`select_columns`].
fn ledger_row<R: LedgerRecord>(row: &Row<'_>) -> rusqlite::Result<LedgerRow<R>> {
    let width = R::COLUMNS.len();
    Ok(LedgerRow {
        id: row.get(0)?,
        record: R::from_row(row, 1)?,
        prev_hash: row.get(width + 1)?,
        row_hash: row.get(width + 2)?,
    })
}

/// Returns the hash of the newest row in `table`.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when the query fails.
pub fn chain_head(conn: &Connection, table: LedgerTable) -> Result<Option<String>, SqliteStoreError> {
    let sql = format!("SELECT row_hash FROM {} ORDER BY id DESC LIMIT 1", table.name());
    Ok(conn.query_row(&sql, [], |row| row.get(0)).optional()?)
}

/// Appends `record` to its ledger table, chaining it to the current head.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Duplicate`] when a unique key already exists,
/// or another [`SqliteStoreError`] when hashing or the insert fails.
pub fn append<R: LedgerRecord>(conn: &Connection, record: &R) -> Result<i64, SqliteStoreError> {
    let prev_hash = chain_head(conn, R::TABLE)?;
    let row_hash = chain_hash(prev_hash.as_deref(), record)?;
    let mut values = record.values();
    values.push(opt_text(prev_hash.as_ref()));
    values.push(SqlValue::Text(row_hash));
    let placeholders: Vec<String> = (1 ..= values.len()).map(|index| format!("?{index}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}, prev_hash, row_hash) VALUES ({})",
        R::TABLE.name(),
        R::COLUMNS.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, params_from_iter(values))?;
    Ok(conn.last_insert_rowid())
}

/// Reads every row of a ledger table in insertion order.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when rows cannot be read or decoded.
pub fn read_ledger<R: LedgerRecord>(
    conn: &Connection,
) -> Result<Vec<LedgerRow<R>>, SqliteStoreError> {
    let sql = format!("SELECT {} FROM {} ORDER BY id", select_columns::<R>(), R::TABLE.name());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], ledger_row::<R>)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Re-walks a ledger table's hash chain.
///
/// Returns true when every row links to its predecessor and its stored hash
/// equals the recomputed one.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when rows cannot be read.
pub fn verify_ledger<R: LedgerRecord>(conn: &Connection) -> Result<bool, SqliteStoreError> {
    let mut prev: Option<String> = None;
    for row in read_ledger::<R>(conn)? {
        if row.prev_hash != prev {
            return Ok(false);
        }
        if chain_hash(prev.as_deref(), &row.record)? != row.row_hash {
            return Ok(false);
        }
        prev = Some(row.row_hash);
    }
    Ok(true)
}

/// Finds the ingested row for an archive digest.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when the query fails.
pub fn find_ingested(
    conn: &Connection,
    bundle_sha256: &str,
) -> Result<Option<LedgerRow<IngestedRecord>>, SqliteStoreError> {
    let sql = format!(
        "SELECT {} FROM ingested_bundles WHERE bundle_sha256 = ?1",
        select_columns::<IngestedRecord>()
    );
    Ok(conn.query_row(&sql, params![bundle_sha256], ledger_row::<IngestedRecord>).optional()?)
}

/// Finds the newest staged row for an archive digest.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when the query fails.
pub fn latest_staged(
    conn: &Connection,
    bundle_sha256: &str,
) -> Result<Option<LedgerRow<StagedRecord>>, SqliteStoreError> {
    let sql = format!(
        "SELECT {} FROM staged_bundles WHERE bundle_sha256 = ?1 ORDER BY id DESC LIMIT 1",
        select_columns::<StagedRecord>()
    );
    Ok(conn.query_row(&sql, params![bundle_sha256], ledger_row::<StagedRecord>).optional()?)
}

/// Loads one staged row with its effective status.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when the query fails.
pub fn staged_entry(conn: &Connection, id: i64) -> Result<Option<StagedEntry>, SqliteStoreError> {
    let sql = format!("SELECT {} FROM staged_bundles WHERE id = ?1", select_columns::<StagedRecord>());
    let Some(row) = conn.query_row(&sql, params![id], ledger_row::<StagedRecord>).optional()?
    else {
        return Ok(None);
    };
    Ok(Some(with_decision(conn, row)?))
}

/// Lists staged rows newest first, optionally filtered by effective status.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when rows cannot be read.
pub fn list_staged(
    conn: &Connection,
    status: Option<StagedStatus>,
) -> Result<Vec<StagedEntry>, SqliteStoreError> {
    let mut rows = read_ledger::<StagedRecord>(conn)?;
    rows.reverse();
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let entry = with_decision(conn, row)?;
        if status.is_none_or(|want| entry.effective_status == want) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Attaches the decision row, if any, to a staged row.
fn with_decision(
    conn: &Connection,
    row: LedgerRow<StagedRecord>,
) -> Result<StagedEntry, SqliteStoreError> {
    let sql = format!(
        "SELECT {} FROM staged_decisions WHERE staged_id = ?1",
        select_columns::<DecisionRecord>()
    );
    let decision = conn
        .query_row(&sql, params![row.id], ledger_row::<DecisionRecord>)
        .optional()?
        .map(|decision| decision.record);
    let effective_status = decision.as_ref().map_or(row.record.status, |decision| decision.decision);
    Ok(StagedEntry {
        row,
        effective_status,
        decision,
    })
}

/// Row counts across the ledger tables.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when a count query fails.
pub fn ledger_counts(conn: &Connection) -> Result<LedgerCounts, SqliteStoreError> {
    let count = |table: LedgerTable| -> Result<u64, SqliteStoreError> {
        let sql = format!("SELECT COUNT(1) FROM {}", table.name());
        let value: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        u64::try_from(value).map_err(|_| SqliteStoreError::Corrupt("negative row count".to_string()))
    };
    Ok(LedgerCounts {
        kg_deltas: count(LedgerTable::KgDeltas)?,
        ingested_bundles: count(LedgerTable::IngestedBundles)?,
        staged_bundles: count(LedgerTable::StagedBundles)?,
        staged_decisions: count(LedgerTable::StagedDecisions)?,
    })
}

// ============================================================================
// SECTION: Live Graph
// ============================================================================

/// Graph mutator writing to the live tables through one connection.
///
/// Used inside [`FieldpackStore::write`] so mutations share the caller's
/// transaction.
pub struct SqlGraphWriter<'c> {
    /// Connection (normally an open transaction).
    conn: &'c Connection,
}

impl<'c> SqlGraphWriter<'c> {
    /// Wraps a connection.
    #[must_use]
    pub const fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
        }
    }
}

/// Canonical JSON text for an attribute map.
fn attrs_text(attrs: &Map<String, Value>) -> Result<String, SqliteStoreError> {
    let bytes = canonical_json_bytes(attrs)?;
    String::from_utf8(bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

impl GraphMutator for SqlGraphWriter<'_> {
    fn upsert_node(
        &mut self,
        id: &str,
        node_type: &str,
        attrs: &Map<String, Value>,
    ) -> Result<(), GraphMutationError> {
        let attrs = attrs_text(attrs)?;
        self.conn
            .execute(
                "INSERT INTO nodes (id, node_type, attrs_json) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET node_type = excluded.node_type,
                     attrs_json = excluded.attrs_json",
                params![id, node_type, attrs],
            )
            .map_err(SqliteStoreError::from)?;
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
        let attrs = attrs_text(attrs)?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO edges (edge_key, src, dst, edge_type, attrs_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![key, src, dst, edge_type, attrs],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(key)
    }

    fn remove_node(&mut self, id: &str) -> Result<(), GraphMutationError> {
        self.conn
            .execute("DELETE FROM edges WHERE src = ?1 OR dst = ?1", params![id])
            .map_err(SqliteStoreError::from)?;
        self.conn
            .execute("DELETE FROM nodes WHERE id = ?1", params![id])
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn remove_edge(&mut self, edge_key: &str) -> Result<(), GraphMutationError> {
        self.conn
            .execute("DELETE FROM edges WHERE edge_key = ?1", params![edge_key])
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }
}

/// Parses a stored attribute map.
fn parse_attrs(text: &str) -> Result<Map<String, Value>, SqliteStoreError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(SqliteStoreError::Corrupt("attrs_json is not an object".to_string())),
        Err(err) => Err(SqliteStoreError::Corrupt(err.to_string())),
    }
}

/// Loads the live graph visible through `conn`.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when rows cannot be read or decoded.
pub fn load_graph(conn: &Connection) -> Result<KnowledgeGraph, SqliteStoreError> {
    let mut nodes = Vec::new();
    {
        let mut stmt = conn.prepare("SELECT id, node_type, attrs_json FROM nodes ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;
        for row in rows {
            let (id, node_type, attrs) = row?;
            nodes.push(GraphNode {
                id,
                node_type,
                attrs: parse_attrs(&attrs)?,
            });
        }
    }
    let mut edges = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT edge_key, src, dst, edge_type, attrs_json FROM edges ORDER BY edge_key",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        for row in rows {
            let (edge_key, src, dst, edge_type, attrs) = row?;
            edges.push(GraphEdge {
                edge_key,
                src,
                dst,
                edge_type,
                attrs: parse_attrs(&attrs)?,
            });
        }
    }
    Ok(KnowledgeGraph::from_parts(nodes, edges))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS nodes (
                    id TEXT PRIMARY KEY,
                    node_type TEXT NOT NULL,
                    attrs_json TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS edges (
                    edge_key TEXT PRIMARY KEY,
                    src TEXT NOT NULL,
                    dst TEXT NOT NULL,
                    edge_type TEXT NOT NULL,
                    attrs_json TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_edges_src ON edges (src);
                CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges (dst);
                CREATE TABLE IF NOT EXISTS kg_deltas (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ts_utc TEXT NOT NULL,
                    source TEXT NOT NULL,
                    delta_kind TEXT NOT NULL,
                    delta_payload TEXT NOT NULL,
                    delta_hash TEXT NOT NULL,
                    prev_hash TEXT,
                    row_hash TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS ingested_bundles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ts_utc TEXT NOT NULL,
                    bundle_sha256 TEXT NOT NULL UNIQUE,
                    bundle_name TEXT NOT NULL,
                    verify_reason TEXT NOT NULL,
                    policy_id TEXT NOT NULL,
                    policy_hash TEXT NOT NULL,
                    allowlist_hash TEXT NOT NULL,
                    toolchain_id TEXT NOT NULL,
                    bundle_map_hash TEXT NOT NULL,
                    ops_count INTEGER NOT NULL,
                    kg_delta_hash TEXT NOT NULL,
                    ingest_kind TEXT NOT NULL,
                    notes TEXT,
                    prev_hash TEXT,
                    row_hash TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS staged_bundles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ts_utc TEXT NOT NULL,
                    bundle_sha256 TEXT NOT NULL,
                    bundle_name TEXT NOT NULL,
                    verify_reason TEXT NOT NULL,
                    policy_id TEXT NOT NULL,
                    policy_hash TEXT NOT NULL,
                    allowlist_hash TEXT NOT NULL,
                    toolchain_id TEXT NOT NULL,
                    bundle_map_hash TEXT NOT NULL,
                    ops_count INTEGER NOT NULL,
                    kg_delta_payload TEXT NOT NULL,
                    kg_delta_hash TEXT NOT NULL,
                    status TEXT NOT NULL,
                    policy_mode TEXT NOT NULL,
                    contracts_report_json TEXT NOT NULL,
                    kg_shacl_report_json TEXT NOT NULL,
                    actor TEXT,
                    notes TEXT,
                    prev_hash TEXT,
                    row_hash TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_staged_bundles_sha
                    ON staged_bundles (bundle_sha256);
                CREATE TABLE IF NOT EXISTS staged_decisions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ts_utc TEXT NOT NULL,
                    staged_id INTEGER NOT NULL UNIQUE REFERENCES staged_bundles (id),
                    decision TEXT NOT NULL,
                    actor TEXT NOT NULL,
                    notes TEXT,
                    prev_hash TEXT,
                    row_hash TEXT NOT NULL
                );",
            )?;
            for table in LedgerTable::ALL {
                let name = table.name();
                tx.execute_batch(&format!(
                    "CREATE TRIGGER IF NOT EXISTS {name}_no_update BEFORE UPDATE ON {name}
                     BEGIN SELECT RAISE(ABORT, '{name} is append-only'); END;
                     CREATE TRIGGER IF NOT EXISTS {name}_no_delete BEFORE DELETE ON {name}
                     BEGIN SELECT RAISE(ABORT, '{name} is append-only'); END;"
                ))?;
            }
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
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
    fn staged_status_labels_round_trip() {
        for status in [
            StagedStatus::Pending,
            StagedStatus::Quarantined,
            StagedStatus::Approved,
            StagedStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<StagedStatus>().unwrap(), status);
        }
        assert!("pending".parse::<StagedStatus>().is_ok());
        assert!("MERGED".parse::<StagedStatus>().is_err());
        assert!(StagedStatus::Quarantined.is_open());
        assert!(!StagedStatus::Rejected.is_open());
    }

    #[test]
    fn select_columns_bracket_content() {
        assert_eq!(
            select_columns::<DecisionRecord>(),
            "id, ts_utc, staged_id, decision, actor, notes, prev_hash, row_hash"
        );
    }

    #[test]
    fn directory_store_paths_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = FieldpackStore::open(SqliteStoreConfig::new(dir.path())).err().unwrap();
        assert!(matches!(err, SqliteStoreError::Invalid(_)));
    }
}
