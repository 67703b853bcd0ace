// crates/fieldpack-config/src/config.rs
// ============================================================================
// Module: Fieldpack Configuration
// Description: Configuration loading and validation for Fieldpack.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: fieldpack-core, fieldpack-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section is optional and falls back to documented defaults, but
//! unknown keys and invalid values fail closed. Relative paths resolve
//! against the directory holding the config file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use fieldpack_core::InclusionFlags;
use fieldpack_store_sqlite::AcceptLimits;
use fieldpack_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "fieldpack.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "FIELDPACK_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum toolchain identifier length.
pub(crate) const MAX_TOOLCHAIN_ID_LENGTH: usize = 128;
/// Default producer toolchain identifier.
const DEFAULT_TOOLCHAIN_ID: &str = "fieldpack-node-a";
/// Default database file name.
const DEFAULT_STORE_PATH: &str = "fieldpack.sqlite3";

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Fieldpack configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldpackConfig {
    /// Producer identity and bundle contents.
    #[serde(default)]
    pub producer: ProducerConfig,
    /// Filesystem layout.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Local governance documents.
    #[serde(default)]
    pub governance: GovernanceConfig,
    /// Consumer store.
    #[serde(default = "default_store")]
    pub store: SqliteStoreConfig,
    /// Consumer growth limits.
    #[serde(default)]
    pub accept: AcceptConfig,
    /// Audit output.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Directory relative paths resolve against (not serialized).
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl FieldpackConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// explicit path, then `FIELDPACK_CONFIG`, then `./fieldpack.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.base_dir = resolved.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// Parses and validates configuration text. Relative paths resolve
    /// against the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.producer.validate()?;
        self.paths.validate()?;
        self.governance.validate()?;
        validate_path_string("store.path", &self.store.path.to_string_lossy())?;
        if self.store.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store.busy_timeout_ms must be positive".to_string()));
        }
        self.accept.validate()?;
        self.audit.validate()
    }

    /// Resolves a configured path against the config directory.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.base_dir.join(path) }
    }

    /// Store configuration with its path resolved.
    #[must_use]
    pub fn store_config(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.resolve(&self.store.path),
            ..self.store.clone()
        }
    }

    /// Graph ledger file, resolved, when configured.
    #[must_use]
    pub fn graph_ledger_path(&self) -> Option<PathBuf> {
        self.paths.graph_ledger.as_deref().map(|path| self.resolve(path))
    }
}

impl Default for FieldpackConfig {
    fn default() -> Self {
        Self {
            producer: ProducerConfig::default(),
            paths: PathsConfig::default(),
            governance: GovernanceConfig::default(),
            store: default_store(),
            accept: AcceptConfig::default(),
            audit: AuditConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

/// Default store section.
fn default_store() -> SqliteStoreConfig {
    SqliteStoreConfig::new(DEFAULT_STORE_PATH)
}

// ============================================================================
// SECTION: Producer
// ============================================================================

/// Producer identity and bundle inclusion switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools, reason = "Each switch maps to one config key.")]
pub struct ProducerConfig {
    /// Toolchain identifier claimed in attestations.
    #[serde(default = "default_toolchain_id")]
    pub toolchain_id: String,
    /// Include raw blobs.
    #[serde(default = "default_true")]
    pub include_raw: bool,
    /// Include extracts.
    #[serde(default = "default_true")]
    pub include_extract: bool,
    /// Include auxiliary blobs.
    #[serde(default = "default_true")]
    pub include_aux: bool,
    /// Include the provenance log.
    #[serde(default = "default_true")]
    pub include_provenance: bool,
    /// Include the graph delta.
    #[serde(default = "default_true")]
    pub include_kg_delta: bool,
    /// Include the SBOM and its envelope.
    #[serde(default = "default_true")]
    pub include_sbom: bool,
    /// Sign attestations.
    #[serde(default = "default_true")]
    pub signing_enabled: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            toolchain_id: default_toolchain_id(),
            include_raw: true,
            include_extract: true,
            include_aux: true,
            include_provenance: true,
            include_kg_delta: true,
            include_sbom: true,
            signing_enabled: true,
        }
    }
}

impl ProducerConfig {
    /// Sealer inclusion flags.
    #[must_use]
    pub const fn inclusion_flags(&self) -> InclusionFlags {
        InclusionFlags {
            raw: self.include_raw,
            extract: self.include_extract,
            aux: self.include_aux,
            provenance: self.include_provenance,
            kg_delta: self.include_kg_delta,
            sbom: self.include_sbom,
        }
    }

    /// Validates the toolchain identifier.
    fn validate(&self) -> Result<(), ConfigError> {
        let id = self.toolchain_id.as_str();
        if id.is_empty() {
            return Err(ConfigError::Invalid("producer.toolchain_id must be non-empty".to_string()));
        }
        if id.len() > MAX_TOOLCHAIN_ID_LENGTH {
            return Err(ConfigError::Invalid("producer.toolchain_id exceeds max length".to_string()));
        }
        if !id.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')) {
            return Err(ConfigError::Invalid(
                "producer.toolchain_id contains invalid characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default toolchain id for serde.
fn default_toolchain_id() -> String {
    DEFAULT_TOOLCHAIN_ID.to_string()
}

/// Serde default for switches that start enabled.
const fn default_true() -> bool {
    true
}

// ============================================================================
// SECTION: Paths
// ============================================================================

/// Filesystem layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// CAS root.
    #[serde(default = "default_cas_root")]
    pub cas_root: PathBuf,
    /// Output directory for sealed bundles.
    #[serde(default = "default_bundles_dir")]
    pub bundles_dir: PathBuf,
    /// Producer private key.
    #[serde(default = "default_signing_key")]
    pub signing_key: PathBuf,
    /// Producer public key.
    #[serde(default = "default_public_key")]
    pub public_key: PathBuf,
    /// Optional graph delta ledger file.
    #[serde(default)]
    pub graph_ledger: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cas_root: default_cas_root(),
            bundles_dir: default_bundles_dir(),
            signing_key: default_signing_key(),
            public_key: default_public_key(),
            graph_ledger: None,
        }
    }
}

impl PathsConfig {
    /// Validates every path entry.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("paths.cas_root", &self.cas_root.to_string_lossy())?;
        validate_path_string("paths.bundles_dir", &self.bundles_dir.to_string_lossy())?;
        validate_path_string("paths.signing_key", &self.signing_key.to_string_lossy())?;
        validate_path_string("paths.public_key", &self.public_key.to_string_lossy())?;
        if self.signing_key == self.public_key {
            return Err(ConfigError::Invalid(
                "paths.signing_key and paths.public_key must differ".to_string(),
            ));
        }
        if let Some(ledger) = &self.graph_ledger {
            validate_path_string("paths.graph_ledger", &ledger.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Default CAS root.
fn default_cas_root() -> PathBuf {
    PathBuf::from("cas")
}

/// Default bundle output directory.
fn default_bundles_dir() -> PathBuf {
    PathBuf::from("bundles")
}

/// Default private key path.
fn default_signing_key() -> PathBuf {
    PathBuf::from("keys/producer.key")
}

/// Default public key path.
fn default_public_key() -> PathBuf {
    PathBuf::from("keys/producer.pub")
}

// ============================================================================
// SECTION: Governance
// ============================================================================

/// Local governance documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovernanceConfig {
    /// MEAP policy document.
    #[serde(default = "default_policy_path")]
    pub policy: PathBuf,
    /// Toolchain allowlist document.
    #[serde(default = "default_allowlist_path")]
    pub allowlist: PathBuf,
    /// Graph shapes document; built-in shapes when absent.
    #[serde(default)]
    pub shapes: Option<PathBuf>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            policy: default_policy_path(),
            allowlist: default_allowlist_path(),
            shapes: None,
        }
    }
}

impl GovernanceConfig {
    /// Validates document paths.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("governance.policy", &self.policy.to_string_lossy())?;
        validate_path_string("governance.allowlist", &self.allowlist.to_string_lossy())?;
        if let Some(shapes) = &self.shapes {
            validate_path_string("governance.shapes", &shapes.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Default policy path.
fn default_policy_path() -> PathBuf {
    PathBuf::from("policy/meap.yaml")
}

/// Default allowlist path.
fn default_allowlist_path() -> PathBuf {
    PathBuf::from("policy/allowlist.yaml")
}

// ============================================================================
// SECTION: Accept Limits
// ============================================================================

/// Consumer-side growth limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptConfig {
    /// Maximum delta lines.
    #[serde(default = "default_max_ops")]
    pub max_ops: usize,
    /// Maximum `ADD_NODE` ops.
    #[serde(default = "default_max_new_nodes")]
    pub max_new_nodes: usize,
    /// Maximum `ADD_EDGE` ops.
    #[serde(default = "default_max_new_edges")]
    pub max_new_edges: usize,
}

impl Default for AcceptConfig {
    fn default() -> Self {
        let limits = AcceptLimits::default();
        Self {
            max_ops: limits.max_ops,
            max_new_nodes: limits.max_new_nodes,
            max_new_edges: limits.max_new_edges,
        }
    }
}

impl AcceptConfig {
    /// Acceptance engine limits.
    #[must_use]
    pub const fn limits(&self) -> AcceptLimits {
        AcceptLimits {
            max_ops: self.max_ops,
            max_new_nodes: self.max_new_nodes,
            max_new_edges: self.max_new_edges,
        }
    }

    /// Rejects zero limits.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("accept.max_ops", self.max_ops),
            ("accept.max_new_nodes", self.max_new_nodes),
            ("accept.max_new_edges", self.max_new_edges),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be positive")));
            }
        }
        Ok(())
    }
}

/// Default op limit.
fn default_max_ops() -> usize {
    AcceptLimits::default().max_ops
}

/// Default node limit.
fn default_max_new_nodes() -> usize {
    AcceptLimits::default().max_new_nodes
}

/// Default edge limit.
fn default_max_new_edges() -> usize {
    AcceptLimits::default().max_new_edges
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    None,
}

/// Audit output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// File path for the `file` sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Requires a path for the file sink.
    fn validate(&self) -> Result<(), ConfigError> {
        match (&self.sink, &self.path) {
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.path is required when audit.sink = \"file\"".to_string()))
            }
            (_, Some(path)) => validate_path_string("audit.path", &path.to_string_lossy()),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
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
    fn validate_path_string_rejects_whitespace_only() {
        let err = validate_path_string("paths.cas_root", "   ").unwrap_err();
        assert!(err.to_string().contains("paths.cas_root must be non-empty"));
    }

    #[test]
    fn validate_path_string_rejects_long_component() {
        let err = validate_path_string("audit.path", &"a".repeat(300)).unwrap_err();
        assert!(err.to_string().contains("path component too long"));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let config = FieldpackConfig {
            base_dir: PathBuf::from("/etc/fieldpack"),
            ..FieldpackConfig::default()
        };
        assert_eq!(config.resolve(Path::new("/var/cas")), PathBuf::from("/var/cas"));
        assert_eq!(config.resolve(Path::new("cas")), PathBuf::from("/etc/fieldpack/cas"));
    }
}
