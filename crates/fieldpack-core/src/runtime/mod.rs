// crates/fieldpack-core/src/runtime/mod.rs
// ============================================================================
// Module: Fieldpack Runtime
// Description: Archive handling, bundle sealing, and bundle verification.
// Purpose: Turn core documents into sealed bundles and verdicts.
// Dependencies: crate::{core, interfaces, audit}, tar
// ============================================================================

//! ## Overview
//! Runtime modules produce and check bundles. The sealer and the verifier
//! share the same archive reader/writer and hashing primitives so a bundle
//! sealed here verifies byte-for-byte elsewhere.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod archive;
pub mod sealer;
pub mod verifier;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use archive::ArchiveError;
pub use archive::ArchiveMember;
pub use sealer::BundleSealer;
pub use sealer::InclusionFlags;
pub use sealer::SealError;
pub use sealer::SealRequest;
pub use sealer::SealedBundle;
pub use verifier::BundleVerifier;
pub use verifier::MeapEvaluation;
pub use verifier::MeapFinding;
pub use verifier::VerifiedBundle;
pub use verifier::VerifyError;
pub use verifier::VerifyResult;
pub use verifier::contracts_report;
pub use verifier::evaluate_meap;
pub use verifier::verify_bundle;
