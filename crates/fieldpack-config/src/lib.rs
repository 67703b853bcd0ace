// crates/fieldpack-config/src/lib.rs
// ============================================================================
// Module: Fieldpack Config Library
// Description: Canonical config model and fail-closed validation.
// Purpose: Single source of truth for fieldpack.toml semantics.
// Dependencies: fieldpack-core, fieldpack-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `fieldpack-config` defines the configuration model shared by the producer
//! and consumer commands. Config inputs are untrusted: loading enforces size,
//! encoding, and path limits before any value is used.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
