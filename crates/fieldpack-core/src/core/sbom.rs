// crates/fieldpack-core/src/core/sbom.rs
// ============================================================================
// Module: Fieldpack SBOM
// Description: Minimal CycloneDX 1.5 bill of materials for the sealing stack.
// Purpose: Ship a signed inventory of the toolchain alongside each bundle.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The BOM lists the Fieldpack core crate and the crates it links for
//! canonicalization, hashing, signing, and archiving. It carries no host
//! details so that sealing on different machines yields identical bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// CycloneDX specification version emitted.
pub const CYCLONEDX_SPEC_VERSION: &str = "1.5";
/// CycloneDX format marker.
pub const CYCLONEDX_FORMAT: &str = "CycloneDX";

/// Crates linked into the sealing path as `(name, version)`.
const SEALING_STACK: &[(&str, &str)] = &[
    ("base64", "0.22"),
    ("ed25519-dalek", "2.1"),
    ("jsonschema", "0.40"),
    ("serde_jcs", "0.1"),
    ("serde_json", "1.0"),
    ("sha2", "0.10"),
    ("tar", "0.4"),
];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Tool that produced the BOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomTool {
    /// Vendor name.
    pub vendor: String,
    /// Tool name.
    pub name: String,
    /// Tool version.
    pub version: String,
}

/// Name/value property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomProperty {
    /// Property name.
    pub name: String,
    /// Property value.
    pub value: String,
}

/// BOM metadata block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomMetadata {
    /// RFC 3339 creation time.
    pub timestamp: String,
    /// Producing tools.
    pub tools: Vec<BomTool>,
    /// Extra properties.
    pub properties: Vec<BomProperty>,
}

/// Library component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomComponent {
    /// Component type (`library`).
    #[serde(rename = "type")]
    pub component_type: String,
    /// Crate name.
    pub name: String,
    /// Crate version.
    pub version: String,
    /// Package URL.
    pub purl: String,
}

/// CycloneDX document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycloneDxBom {
    /// Always `CycloneDX`.
    #[serde(rename = "bomFormat")]
    pub bom_format: String,
    /// Spec version.
    #[serde(rename = "specVersion")]
    pub spec_version: String,
    /// BOM revision.
    pub version: u32,
    /// Metadata.
    pub metadata: BomMetadata,
    /// Components sorted by name.
    pub components: Vec<BomComponent>,
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds the BOM for this build of Fieldpack at `timestamp`.
#[must_use]
pub fn build_cyclonedx_bom(timestamp: &str) -> CycloneDxBom {
    let own_version = env!("CARGO_PKG_VERSION");
    let mut components: Vec<BomComponent> = SEALING_STACK
        .iter()
        .map(|(name, version)| library(name, version))
        .chain(std::iter::once(library(env!("CARGO_PKG_NAME"), own_version)))
        .collect();
    components.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
    CycloneDxBom {
        bom_format: CYCLONEDX_FORMAT.to_string(),
        spec_version: CYCLONEDX_SPEC_VERSION.to_string(),
        version: 1,
        metadata: BomMetadata {
            timestamp: timestamp.to_string(),
            tools: vec![BomTool {
                vendor: "Fieldpack".to_string(),
                name: "fieldpack".to_string(),
                version: own_version.to_string(),
            }],
            properties: vec![BomProperty {
                name: "fieldpack.sbom.scope".to_string(),
                value: "sealing-stack".to_string(),
            }],
        },
        components,
    }
}

/// Builds a cargo library component.
fn library(name: &str, version: &str) -> BomComponent {
    BomComponent {
        component_type: "library".to_string(),
        name: name.to_string(),
        version: version.to_string(),
        purl: format!("pkg:cargo/{name}@{version}"),
    }
}
