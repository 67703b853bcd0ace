// crates/fieldpack-core/src/lib.rs
// ============================================================================
// Module: Fieldpack Core Library
// Description: Public API surface for the Fieldpack bundle protocol.
// Purpose: Expose core types, interfaces, audit sinks, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime, audit}
// ============================================================================

//! ## Overview
//! Fieldpack moves verified units of work between a producer and a consumer.
//! The producer stores raw material in a content-addressable store and seals
//! it into a signed, deterministic bundle. The consumer re-verifies the bundle
//! against its own governance policy before any of its graph delta is merged.
//! This crate holds everything both sides share; persistence and acceptance
//! live in `fieldpack-store-sqlite`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use audit::FieldpackAuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use interfaces::Clock;
pub use interfaces::FixedClock;
pub use interfaces::GraphMutationError;
pub use interfaces::GraphMutator;
pub use interfaces::SystemClock;
pub use runtime::BundleSealer;
pub use runtime::BundleVerifier;
pub use runtime::InclusionFlags;
pub use runtime::SealError;
pub use runtime::SealRequest;
pub use runtime::SealedBundle;
pub use runtime::VerifiedBundle;
pub use runtime::VerifyError;
pub use runtime::VerifyResult;
pub use runtime::verify_bundle;
