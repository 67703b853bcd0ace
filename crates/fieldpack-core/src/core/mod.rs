// crates/fieldpack-core/src/core/mod.rs
// ============================================================================
// Module: Fieldpack Core Types
// Description: Canonical codec, documents, and graph model shared by every crate.
// Purpose: Provide stable, serializable types for bundles, policies, and deltas.
// Dependencies: serde, serde_jcs, sha2, ed25519-dalek
// ============================================================================

//! ## Overview
//! Core types define the bundle documents (manifest, attestation, DSSE
//! envelopes, SBOM), governance inputs (MEAP policy, allowlist, shapes), the
//! knowledge graph and its delta format, and the hashing primitives every
//! digest in the system is computed with.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod allowlist;
pub mod artifact;
pub mod cas;
pub mod contracts;
pub mod delta;
pub mod dsse;
pub mod graph;
pub mod hashing;
pub mod keys;
pub mod manifest;
pub mod policy;
pub mod provenance;
pub mod sbom;
pub mod shacl;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use allowlist::Allowlist;
pub use allowlist::ToolchainEntry;
pub use artifact::ArtifactKind;
pub use artifact::classify;
pub use cas::CasError;
pub use cas::CasKind;
pub use cas::ContentStore;
pub use contracts::ContractIssue;
pub use contracts::ContractKind;
pub use contracts::ContractReport;
pub use contracts::ContractsReport;
pub use contracts::validate_contract;
pub use delta::DeltaError;
pub use delta::DeltaOp;
pub use delta::GraphDelta;
pub use dsse::DsseEnvelope;
pub use dsse::DsseError;
pub use dsse::Statement;
pub use dsse::Subject;
pub use graph::GraphEdge;
pub use graph::GraphNode;
pub use graph::KnowledgeGraph;
pub use graph::edge_key;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::canonical_sha256_hex;
pub use hashing::chain_hash;
pub use hashing::sha256_hex;
pub use keys::Ed25519KeyPair;
pub use keys::KeyError;
pub use keys::PublicKey;
pub use keys::load_or_create;
pub use manifest::Attestation;
pub use manifest::Manifest;
pub use policy::MeapPolicy;
pub use policy::PolicyError;
pub use policy::PolicyMode;
pub use policy::Thresholds;
pub use provenance::ProvenanceError;
pub use provenance::ProvenanceEvent;
pub use provenance::ProvenanceLog;
pub use provenance::verify_chain;
pub use sbom::CycloneDxBom;
pub use shacl::Severity;
pub use shacl::ShapeIssue;
pub use shacl::ShapeReport;
pub use shacl::ShapeError;
pub use shacl::ShapeSet;
pub use shacl::validate_graph;
pub use time::TimeError;
pub use time::UtcTimestamp;
