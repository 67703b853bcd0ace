// crates/fieldpack-core/src/core/contracts.rs
// ============================================================================
// Module: Fieldpack Interface Contracts
// Description: Embedded JSON Schemas for studspec/tubespec bundle entries.
// Purpose: Reject bundles whose declared interface contracts are malformed.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! A bundle may carry `studspec.json` (component interface) and
//! `tubespec.json` (runtime environment) at its root. Both are validated with
//! Draft 2020-12 schemas compiled from documents embedded in this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use jsonschema::Draft;
use jsonschema::Validator;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::manifest::STUDSPEC_ENTRY;
use crate::core::manifest::TUBESPEC_ENTRY;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Contract document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    /// Component interface contract.
    Studspec,
    /// Runtime environment contract.
    Tubespec,
}

impl ContractKind {
    /// Both kinds in verification order.
    pub const ALL: [Self; 2] = [Self::Studspec, Self::Tubespec];

    /// Archive entry name.
    #[must_use]
    pub const fn entry_name(self) -> &'static str {
        match self {
            Self::Studspec => STUDSPEC_ENTRY,
            Self::Tubespec => TUBESPEC_ENTRY,
        }
    }

    /// Verifier failure reason.
    #[must_use]
    pub const fn failure_reason(self) -> &'static str {
        match self {
            Self::Studspec => "invalid_studspec",
            Self::Tubespec => "invalid_tubespec",
        }
    }

    /// Resolves an entry name to a contract kind.
    #[must_use]
    pub fn from_entry_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.entry_name() == name)
    }

    /// Embedded schema document.
    fn schema(self) -> Value {
        match self {
            Self::Studspec => studspec_schema(),
            Self::Tubespec => tubespec_schema(),
        }
    }
}

/// One contract validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractIssue {
    /// Validator message.
    pub message: String,
    /// Issuing validator.
    pub validator: String,
}

/// Validation outcome for one contract entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractReport {
    /// True when no issues were found.
    pub ok: bool,
    /// Findings.
    pub issues: Vec<ContractIssue>,
}

/// Contract outcomes for a bundle; `None` when the entry is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractsReport {
    /// `studspec.json` outcome.
    pub studspec: Option<ContractReport>,
    /// `tubespec.json` outcome.
    pub tubespec: Option<ContractReport>,
}

impl ContractsReport {
    /// True when every present contract validated.
    #[must_use]
    pub fn ok(&self) -> bool {
        [&self.studspec, &self.tubespec]
            .into_iter()
            .all(|report| report.as_ref().is_none_or(|report| report.ok))
    }

    /// Records the outcome for `kind`.
    pub fn set(&mut self, kind: ContractKind, report: ContractReport) {
        match kind {
            ContractKind::Studspec => self.studspec = Some(report),
            ContractKind::Tubespec => self.tubespec = Some(report),
        }
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates raw contract bytes.
#[must_use]
pub fn validate_contract(kind: ContractKind, bytes: &[u8]) -> ContractReport {
    let instance: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(err) => {
            return ContractReport {
                ok: false,
                issues: vec![ContractIssue {
                    message: format!("invalid json: {err}"),
                    validator: "json".to_string(),
                }],
            };
        }
    };
    let validator = match compile_schema(&kind.schema()) {
        Ok(validator) => validator,
        Err(message) => {
            return ContractReport {
                ok: false,
                issues: vec![ContractIssue {
                    message,
                    validator: "schema".to_string(),
                }],
            };
        }
    };
    let issues: Vec<ContractIssue> = validator
        .iter_errors(&instance)
        .map(|err| ContractIssue {
            message: err.to_string(),
            validator: "jsonschema".to_string(),
        })
        .collect();
    ContractReport {
        ok: issues.is_empty(),
        issues,
    }
}

/// Compiles an embedded schema.
fn compile_schema(schema: &Value) -> Result<Validator, String> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| format!("invalid schema: {err}"))
}

// ============================================================================
// SECTION: Schemas
// ============================================================================

/// Component interface contract schema (v1).
fn studspec_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://fieldpack.dev/schemas/studspec_v1.json",
        "title": "StudSpec v1",
        "type": "object",
        "required": ["studspec", "memite_id", "kind", "io", "constraints"],
        "properties": {
            "studspec": {"type": "string", "const": "1.0"},
            "memite_id": {"type": "string", "minLength": 3},
            "kind": {
                "type": "string",
                "enum": ["frontend", "backend", "db", "filler", "evaluator", "tool", "pipeline"]
            },
            "io": {
                "type": "object",
                "required": ["inputs", "outputs"],
                "properties": {
                    "inputs": {"type": "array", "items": {"$ref": "#/$defs/ioPort"}},
                    "outputs": {"type": "array", "items": {"$ref": "#/$defs/ioPort"}}
                }
            },
            "constraints": {
                "type": "object",
                "required": ["determinism"],
                "properties": {
                    "determinism": {"type": "string", "enum": ["strict", "bounded", "best_effort"]},
                    "max_ram_mb": {"type": "integer", "minimum": 0},
                    "max_latency_ms": {"type": "integer", "minimum": 0},
                    "side_effects": {"type": "array", "items": {"type": "string"}}
                }
            },
            "deps": {"type": "array", "items": {"type": "string"}},
            "provenance": {"type": "object"},
            "attestation": {"type": "object"}
        },
        "$defs": {
            "ioPort": {
                "type": "object",
                "required": ["name", "schema"],
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "schema": {"type": "string", "minLength": 1},
                    "optional": {"type": "boolean"}
                }
            }
        }
    })
}

/// Runtime environment contract schema (v1).
fn tubespec_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://fieldpack.dev/schemas/tubespec_v1.json",
        "title": "TubeSpec v1",
        "type": "object",
        "required": ["tubespec", "runtime", "deps"],
        "properties": {
            "tubespec": {"type": "string", "const": "1.0"},
            "runtime": {
                "type": "object",
                "properties": {
                    "python": {"type": "string"},
                    "rust": {"type": "string"},
                    "os": {"type": "string"},
                    "arch": {"type": "string"},
                    "device": {"type": "string"},
                    "accelerators": {"type": "array", "items": {"type": "string"}}
                },
                "minProperties": 1
            },
            "deps": {"type": "array", "items": {"type": "string"}},
            "assets": {"type": "array", "items": {"type": "string"}},
            "limits": {"type": "object"},
            "compat": {"type": "object"},
            "notes": {"type": "string"}
        }
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_tubespec_passes() {
        let doc = br#"{"tubespec":"1.0","runtime":{"os":"linux"},"deps":[]}"#;
        let report = validate_contract(ContractKind::Tubespec, doc);
        assert!(report.ok);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn studspec_missing_fields_fail() {
        let report = validate_contract(ContractKind::Studspec, br#"{"studspec":"1.0"}"#);
        assert!(!report.ok);
        assert!(!report.issues.is_empty());
    }
}
