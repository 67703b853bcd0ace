// crates/fieldpack-core/src/core/artifact.rs
// ============================================================================
// Module: Fieldpack Artifact Kinds
// Description: Closed set of artifact kinds and name-based classification.
// Purpose: Drive the policy artifact-type allow-list.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Closed set of artifact kinds and name-based classification used by the
//! policy artifact-type allow-list.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Kinds
// ============================================================================

/// Artifact kind assigned to every bundle entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Source code and markup.
    Code,
    /// Domain-specific language sources.
    Dsl,
    /// ONNX models.
    Onnx,
    /// Model weights.
    Weights,
    /// Human-readable reports and documents.
    Report,
    /// Bundle metadata (manifest, attestation, signatures).
    Bundle,
    /// Anything else.
    Blob,
    /// Provenance logs.
    Provenance,
    /// Software bill of materials.
    Sbom,
    /// Graph delta logs.
    KgDelta,
}

impl ArtifactKind {
    /// Every kind.
    pub const ALL: [Self; 10] = [
        Self::Code,
        Self::Dsl,
        Self::Onnx,
        Self::Weights,
        Self::Report,
        Self::Bundle,
        Self::Blob,
        Self::Provenance,
        Self::Sbom,
        Self::KgDelta,
    ];

    /// Policy label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Dsl => "dsl",
            Self::Onnx => "onnx",
            Self::Weights => "weights",
            Self::Report => "report",
            Self::Bundle => "bundle",
            Self::Blob => "blob",
            Self::Provenance => "provenance",
            Self::Sbom => "sbom",
            Self::KgDelta => "kg_delta",
        }
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Classifies a bundle entry name.
#[must_use]
pub fn classify(name: &str) -> ArtifactKind {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    if matches!(
        file_name,
        "manifest.json" | "attestation.json" | "attestation.sig" | "attestation.dsse.json"
    ) {
        return ArtifactKind::Bundle;
    }
    if name.starts_with("sbom/") || file_name.ends_with("sbom.json") {
        return ArtifactKind::Sbom;
    }
    let extension = file_name
        .rfind('.')
        .filter(|index| *index > 0)
        .map(|index| file_name[index..].to_ascii_lowercase());
    let extension = extension.as_deref().unwrap_or_default();
    if file_name.starts_with("provenance") && extension == ".jsonl" {
        return ArtifactKind::Provenance;
    }
    match extension {
        ".py" | ".js" | ".ts" | ".rs" | ".html" | ".css" => ArtifactKind::Code,
        ".dsl" => ArtifactKind::Dsl,
        ".md" | ".txt" | ".csv" | ".pdf" | ".docx" => ArtifactKind::Report,
        ".onnx" => ArtifactKind::Onnx,
        ".pt" | ".pth" | ".bin" | ".safetensors" => ArtifactKind::Weights,
        ".jsonl" => ArtifactKind::KgDelta,
        _ => ArtifactKind::Blob,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_name_rules() {
        assert_eq!(classify("manifest.json"), ArtifactKind::Bundle);
        assert_eq!(classify("attestation.dsse.json"), ArtifactKind::Bundle);
        assert_eq!(classify("sbom/bom.dsse.json"), ArtifactKind::Sbom);
        assert_eq!(classify("sbom/bom.cdx.json"), ArtifactKind::Sbom);
        assert_eq!(classify("provenance.jsonl"), ArtifactKind::Provenance);
        assert_eq!(classify("kg_delta.jsonl"), ArtifactKind::KgDelta);
        assert_eq!(classify("studspec.json"), ArtifactKind::Blob);
        assert_eq!(classify("model.ONNX"), ArtifactKind::Onnx);
        assert_eq!(classify(&format!("raw/sha256/{}", "a".repeat(64))), ArtifactKind::Blob);
    }
}
