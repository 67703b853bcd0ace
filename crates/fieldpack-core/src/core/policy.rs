// crates/fieldpack-core/src/core/policy.rs
// ============================================================================
// Module: Fieldpack MEAP Policy
// Description: Governance document controlling verification and acceptance.
// Purpose: Parse, normalize, and hash `meap_v1` policy documents.
// Dependencies: crate::core::{artifact, hashing}, serde, serde_yaml
// ============================================================================

//! ## Overview
//! Policies are YAML documents with a `meap_v1` section. Documents in the
//! older `policy:` layout are normalized into the same shape, and a document
//! with neither section yields the default `REVIEW_ONLY` policy. The policy
//! hash is computed over the normalized, typed policy, so formatting and key
//! order in the source file never change it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::artifact::ArtifactKind;
use crate::core::hashing::canonical_sha256_hex;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Policy loading errors.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// File could not be read.
    #[error("policy io error: {0}")]
    Io(String),
    /// Document did not parse.
    #[error("policy parse error: {0}")]
    Parse(String),
    /// Hashing failed.
    #[error("policy hash error: {0}")]
    Hash(String),
}

// ============================================================================
// SECTION: Mode
// ============================================================================

/// Acceptance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyMode {
    /// Apply, validate, and commit without review.
    AutoMerge,
    /// Stage as pending for human review.
    ReviewOnly,
    /// Stage as quarantined.
    Quarantine,
    /// Refuse everything.
    Kill,
}

impl PolicyMode {
    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoMerge => "AUTO_MERGE",
            Self::ReviewOnly => "REVIEW_ONLY",
            Self::Quarantine => "QUARANTINE",
            Self::Kill => "KILL",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyMode {
    type Err = PolicyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AUTO_MERGE" => Ok(Self::AutoMerge),
            "REVIEW_ONLY" => Ok(Self::ReviewOnly),
            "QUARANTINE" => Ok(Self::Quarantine),
            "KILL" => Ok(Self::Kill),
            other => Err(PolicyError::Parse(format!("unknown policy mode: {other}"))),
        }
    }
}

// ============================================================================
// SECTION: Policy Sections
// ============================================================================

/// Verification thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Thresholds mirror independent policy switches."
)]
pub struct Thresholds {
    /// Maximum total uncompressed entry size in MiB.
    pub max_bundle_mb: u64,
    /// Maximum number of archive entries.
    pub max_files_in_bundle: u64,
    /// Require and verify `attestation.sig`.
    pub require_signature: bool,
    /// Recompute and compare every manifest digest.
    pub require_manifest_hashes: bool,
    /// Compare `bundle_map_hash` claims.
    pub require_deterministic_bundle_hash: bool,
    /// Compare the attested policy hash with the local one.
    pub require_policy_hash_match: bool,
    /// Compare the attested allowlist hash with the local one.
    pub require_allowlist_hash_match: bool,
    /// Require and verify `attestation.dsse.json`.
    pub require_dsse_attestations: bool,
    /// Require and verify the CycloneDX SBOM and its envelope.
    pub require_cyclonedx_sbom: bool,
    /// Require an intact provenance event chain.
    pub require_provenance_chain_intact: bool,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_bundle_mb: 250,
            max_files_in_bundle: 20_000,
            require_signature: true,
            require_manifest_hashes: true,
            require_deterministic_bundle_hash: true,
            require_policy_hash_match: false,
            require_allowlist_hash_match: false,
            require_dsse_attestations: false,
            require_cyclonedx_sbom: false,
            require_provenance_chain_intact: false,
        }
    }
}

/// Semantic acceptance rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptRules {
    /// Permitted artifact kinds; empty allows every kind.
    pub allowed_artifact_types: Vec<ArtifactKind>,
}

/// Kill switch as written in documents: a flag or a table.
#[derive(Deserialize)]
#[serde(untagged)]
enum KillSwitchDoc {
    /// `kill_switch: true`
    Flag(bool),
    /// `kill_switch: {enabled: true}` or `{kill: true}`
    Table {
        /// Enabled flag.
        #[serde(default)]
        enabled: bool,
        /// Alternate enabled flag.
        #[serde(default)]
        kill: bool,
    },
}

/// Kill switch refusing every bundle when enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "KillSwitchDoc")]
pub struct KillSwitch {
    /// Enabled flag.
    pub enabled: bool,
}

impl From<KillSwitchDoc> for KillSwitch {
    fn from(doc: KillSwitchDoc) -> Self {
        let enabled = match doc {
            KillSwitchDoc::Flag(flag) => flag,
            KillSwitchDoc::Table {
                enabled,
                kill,
            } => enabled || kill,
        };
        Self {
            enabled,
        }
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Normalized `meap_v1` policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeapPolicy {
    /// Policy identifier.
    #[serde(default = "default_policy_id")]
    pub policy_id: String,
    /// Policy revision.
    #[serde(default = "default_policy_version")]
    pub policy_version: u32,
    /// Default acceptance mode.
    #[serde(default = "default_mode")]
    pub mode: PolicyMode,
    /// Verification thresholds.
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Archive paths no bundle may contain.
    #[serde(default)]
    pub protected_paths: Vec<String>,
    /// Semantic acceptance rules.
    #[serde(default)]
    pub accept: AcceptRules,
    /// Kill switch.
    #[serde(default)]
    pub kill_switch: KillSwitch,
}

/// Default policy identifier for `meap_v1` documents.
fn default_policy_id() -> String {
    "MEAP_V1".to_string()
}

/// Default policy revision.
const fn default_policy_version() -> u32 {
    1
}

/// Default acceptance mode.
const fn default_mode() -> PolicyMode {
    PolicyMode::ReviewOnly
}

impl Default for MeapPolicy {
    fn default() -> Self {
        Self {
            policy_id: "MEAP_V1_DEFAULT".to_string(),
            policy_version: 1,
            mode: PolicyMode::ReviewOnly,
            thresholds: Thresholds::default(),
            protected_paths: Vec::new(),
            accept: AcceptRules::default(),
            kill_switch: KillSwitch::default(),
        }
    }
}

/// Header of the older `policy:` layout.
#[derive(Debug, Default, Deserialize)]
struct LegacyHeader {
    /// Policy name.
    #[serde(default)]
    name: Option<String>,
    /// Policy revision.
    #[serde(default)]
    version: Option<u32>,
    /// Acceptance mode.
    #[serde(default)]
    mode: Option<PolicyMode>,
}

/// Limits of the older layout.
#[derive(Debug, Default, Deserialize)]
struct LegacyLimits {
    /// Maximum size in MiB.
    #[serde(default)]
    max_bundle_mb: Option<u64>,
    /// Maximum entry count.
    #[serde(default)]
    max_files_in_bundle: Option<u64>,
}

/// Replay section of the older layout.
#[derive(Debug, Default, Deserialize)]
struct LegacyReplay {
    /// Require the provenance chain.
    #[serde(default)]
    require_provenance_chain: Option<bool>,
}

/// Accept section of the older layout.
#[derive(Debug, Default, Deserialize)]
struct LegacyAccept {
    /// Allowed kinds; absent means every kind.
    #[serde(default)]
    allowed_artifact_types: Option<Vec<ArtifactKind>>,
}

/// Raw policy document in either layout.
#[derive(Debug, Default, Deserialize)]
struct PolicyDocument {
    /// Preferred layout.
    #[serde(default)]
    meap_v1: Option<MeapPolicy>,
    /// Older layout header.
    #[serde(default)]
    policy: Option<LegacyHeader>,
    /// Older layout thresholds override.
    #[serde(default)]
    thresholds: Option<Thresholds>,
    /// Older layout limits.
    #[serde(default)]
    limits: Option<LegacyLimits>,
    /// Older layout replay section.
    #[serde(default)]
    replay: Option<LegacyReplay>,
    /// Older layout protected paths.
    #[serde(default)]
    protected_paths: Option<Vec<String>>,
    /// Older layout accept section.
    #[serde(default)]
    accept: Option<LegacyAccept>,
    /// Older layout kill switch.
    #[serde(default)]
    kill_switch: Option<KillSwitch>,
}

impl PolicyDocument {
    /// Normalizes either layout into a [`MeapPolicy`].
    fn normalize(self) -> MeapPolicy {
        if let Some(policy) = self.meap_v1 {
            return policy;
        }
        let Some(header) = self.policy else {
            return MeapPolicy::default();
        };
        let limits = self.limits.unwrap_or_default();
        let require_chain =
            self.replay.and_then(|replay| replay.require_provenance_chain).unwrap_or(true);
        let thresholds = self.thresholds.unwrap_or_else(|| Thresholds {
            max_bundle_mb: limits.max_bundle_mb.unwrap_or(250),
            max_files_in_bundle: limits.max_files_in_bundle.unwrap_or(20_000),
            require_signature: true,
            require_manifest_hashes: true,
            require_deterministic_bundle_hash: true,
            require_policy_hash_match: require_chain,
            require_allowlist_hash_match: true,
            require_dsse_attestations: false,
            require_cyclonedx_sbom: false,
            require_provenance_chain_intact: require_chain,
        });
        let allowed = self
            .accept
            .and_then(|accept| accept.allowed_artifact_types)
            .unwrap_or_else(|| ArtifactKind::ALL.to_vec());
        MeapPolicy {
            policy_id: header.name.unwrap_or_else(|| "MEAP_V1_LEGACY".to_string()),
            policy_version: header.version.unwrap_or(1),
            mode: header.mode.unwrap_or(PolicyMode::ReviewOnly),
            thresholds,
            protected_paths: self.protected_paths.unwrap_or_default(),
            accept: AcceptRules {
                allowed_artifact_types: allowed,
            },
            kill_switch: self.kill_switch.unwrap_or_default(),
        }
    }
}

impl MeapPolicy {
    /// Parses and normalizes a YAML (or JSON) policy document.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] when the document is malformed.
    pub fn from_yaml_str(text: &str) -> Result<Self, PolicyError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: PolicyDocument =
            serde_yaml::from_str(text).map_err(|err| PolicyError::Parse(err.to_string()))?;
        Ok(document.normalize())
    }

    /// Loads a policy document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = fs::read_to_string(path)
            .map_err(|err| PolicyError::Io(format!("{}: {err}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Canonical hash of the normalized policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Hash`] when canonicalization fails.
    pub fn canonical_hash(&self) -> Result<String, PolicyError> {
        canonical_sha256_hex(self).map_err(|err| PolicyError::Hash(err.to_string()))
    }

    /// Returns the first protected path covering `entry`, if any.
    #[must_use]
    pub fn protected_match(&self, entry: &str) -> Option<&str> {
        self.protected_paths.iter().map(String::as_str).find(|path| {
            let base = path.trim_end_matches('/');
            !base.is_empty()
                && (entry == base
                    || entry.strip_prefix(base).is_some_and(|rest| rest.starts_with('/')))
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
