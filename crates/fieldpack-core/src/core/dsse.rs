// crates/fieldpack-core/src/core/dsse.rs
// ============================================================================
// Module: Fieldpack DSSE Envelopes
// Description: DSSE v1 signing and verification of in-toto statements.
// Purpose: Bind the manifest and the SBOM to the producer key.
// Dependencies: crate::core::{hashing, keys}, base64, serde_json
// ============================================================================

//! ## Overview
//! Envelopes sign the pre-authentication encoding
//! `DSSEv1 <len(type)> <type> <len(payload)> <payload>` of a canonical JSON
//! in-toto statement. Verification accepts the first signature whose key id
//! matches the expected trust root and whose signature verifies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashError;
use crate::core::hashing::canonical_json_bytes;
use crate::core::keys::Ed25519KeyPair;
use crate::core::keys::PublicKey;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// DSSE payload type for in-toto statements.
pub const INTOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";
/// In-toto statement type.
pub const INTOTO_STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";
/// Predicate type binding the manifest.
pub const BUILD_PREDICATE_TYPE: &str = "https://fieldpack.dev/predicates/build/v1";
/// Predicate type binding the SBOM.
pub const SBOM_PREDICATE_TYPE: &str = "https://fieldpack.dev/predicates/sbom/v1";

// ============================================================================
// SECTION: Types
// ============================================================================

/// One envelope signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsseSignature {
    /// Signer key id.
    #[serde(default)]
    pub keyid: String,
    /// Base64 signature.
    #[serde(default)]
    pub sig: String,
}

/// DSSE envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsseEnvelope {
    /// Payload media type.
    #[serde(rename = "payloadType", default)]
    pub payload_type: String,
    /// Base64 payload.
    #[serde(default)]
    pub payload: String,
    /// Signatures.
    #[serde(default)]
    pub signatures: Vec<DsseSignature>,
}

/// In-toto subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Artifact name.
    pub name: String,
    /// Digest map (`sha256 -> hex`).
    pub digest: BTreeMap<String, String>,
}

impl Subject {
    /// Builds a SHA-256 subject.
    #[must_use]
    pub fn sha256(name: &str, digest: &str) -> Self {
        Self {
            name: name.to_string(),
            digest: BTreeMap::from([(DEFAULT_HASH_ALGORITHM.label().to_string(), digest.to_string())]),
        }
    }
}

/// In-toto statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement type.
    #[serde(rename = "_type")]
    pub statement_type: String,
    /// Bound subjects.
    pub subject: Vec<Subject>,
    /// Predicate type URI.
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    /// Predicate body.
    pub predicate: Value,
}

impl Statement {
    /// Builds a v1 statement.
    #[must_use]
    pub fn new(subject: Vec<Subject>, predicate_type: &str, predicate: Value) -> Self {
        Self {
            statement_type: INTOTO_STATEMENT_TYPE.to_string(),
            subject,
            predicate_type: predicate_type.to_string(),
            predicate,
        }
    }

    /// Returns true when a subject named `name` carries SHA-256 `digest`.
    #[must_use]
    pub fn binds(&self, name: &str, digest: &str) -> bool {
        self.subject.iter().any(|subject| {
            subject.name == name
                && subject.digest.get(DEFAULT_HASH_ALGORITHM.label()).map(String::as_str)
                    == Some(digest)
        })
    }
}

/// DSSE failures; the display form is the machine-readable code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DsseError {
    /// Envelope is not valid JSON.
    #[error("dsse_not_dict")]
    NotDict,
    /// `payloadType` is missing.
    #[error("dsse_missing_payloadType")]
    MissingPayloadType,
    /// `payload` is missing.
    #[error("dsse_missing_payload")]
    MissingPayload,
    /// No signatures.
    #[error("dsse_missing_signatures")]
    MissingSignatures,
    /// Payload is not base64.
    #[error("dsse_bad_payload_encoding")]
    PayloadEncoding,
    /// No signature carried the expected key id.
    #[error("dsse_keyid_mismatch")]
    KeyIdMismatch,
    /// No signature verified.
    #[error("dsse_bad_signature")]
    BadSignature,
    /// Payload is not an in-toto statement.
    #[error("dsse_payload_malformed")]
    PayloadMalformed,
    /// Canonicalization failed while signing.
    #[error("dsse_canonicalization_failed")]
    Canonicalization,
}

impl From<HashError> for DsseError {
    fn from(_: HashError) -> Self {
        Self::Canonicalization
    }
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// DSSE v1 pre-authentication encoding.
#[must_use]
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload_type.len() + payload.len() + 32);
    out.extend_from_slice(b"DSSEv1 ");
    out.extend_from_slice(payload_type.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload_type.as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload);
    out
}

/// Signs an in-toto statement into a single-signature envelope.
///
/// # Errors
///
/// Returns [`DsseError::Canonicalization`] when the statement cannot be
/// canonicalized.
pub fn sign_statement(
    statement: &Statement,
    key_pair: &Ed25519KeyPair,
) -> Result<DsseEnvelope, DsseError> {
    let payload = canonical_json_bytes(statement)?;
    let signature = key_pair.sign(&pae(INTOTO_PAYLOAD_TYPE, &payload));
    Ok(DsseEnvelope {
        payload_type: INTOTO_PAYLOAD_TYPE.to_string(),
        payload: BASE64.encode(&payload),
        signatures: vec![DsseSignature {
            keyid: key_pair.key_id(),
            sig: BASE64.encode(signature),
        }],
    })
}

/// Parses and verifies envelope bytes, returning the decoded statement.
///
/// # Errors
///
/// Returns [`DsseError`] describing the first failed check.
pub fn verify_envelope_bytes(
    bytes: &[u8],
    trust_root: &PublicKey,
) -> Result<Statement, DsseError> {
    let envelope: DsseEnvelope =
        serde_json::from_slice(bytes).map_err(|_| DsseError::NotDict)?;
    verify_envelope(&envelope, trust_root)
}

/// Verifies an envelope against `trust_root`, returning the statement.
///
/// # Errors
///
/// Returns [`DsseError`] describing the first failed check.
pub fn verify_envelope(
    envelope: &DsseEnvelope,
    trust_root: &PublicKey,
) -> Result<Statement, DsseError> {
    if envelope.payload_type.is_empty() {
        return Err(DsseError::MissingPayloadType);
    }
    if envelope.payload.is_empty() {
        return Err(DsseError::MissingPayload);
    }
    if envelope.signatures.is_empty() {
        return Err(DsseError::MissingSignatures);
    }
    let payload =
        BASE64.decode(envelope.payload.as_bytes()).map_err(|_| DsseError::PayloadEncoding)?;
    let message = pae(&envelope.payload_type, &payload);
    let expected_keyid = trust_root.key_id();
    let mut last = DsseError::KeyIdMismatch;
    for signature in &envelope.signatures {
        if signature.keyid != expected_keyid {
            last = DsseError::KeyIdMismatch;
            continue;
        }
        let verified = BASE64
            .decode(signature.sig.trim().as_bytes())
            .is_ok_and(|sig| trust_root.verify(&message, &sig));
        if verified {
            return serde_json::from_slice(&payload).map_err(|_| DsseError::PayloadMalformed);
        }
        last = DsseError::BadSignature;
    }
    Err(last)
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
    fn pae_matches_dsse_layout() {
        assert_eq!(pae("t", b"hello"), b"DSSEv1 1 t 5 hello".to_vec());
    }

    #[test]
    fn envelope_round_trip_and_foreign_key_rejected() {
        let pair = Ed25519KeyPair::from_seed(&[7_u8; 32]);
        let other = Ed25519KeyPair::from_seed(&[8_u8; 32]);
        let statement = Statement::new(
            vec![Subject::sha256("manifest.json", &"a".repeat(64))],
            BUILD_PREDICATE_TYPE,
            json!({"label": "x"}),
        );
        let envelope = sign_statement(&statement, &pair).unwrap();
        let decoded = verify_envelope(&envelope, &pair.public_key()).unwrap();
        assert!(decoded.binds("manifest.json", &"a".repeat(64)));
        assert_eq!(
            verify_envelope(&envelope, &other.public_key()).unwrap_err(),
            DsseError::KeyIdMismatch
        );
    }
}
