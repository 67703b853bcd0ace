// crates/fieldpack-core/src/core/time.rs
// ============================================================================
// Module: Fieldpack Time Model
// Description: UTC timestamps supplied by callers and rendered as RFC 3339.
// Purpose: Keep sealed bundles and ledger rows reproducible under replay.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Fieldpack never reads the wall clock inside hashed content. Timestamps are
//! provided through a [`Clock`](crate::interfaces::Clock) or passed in
//! explicitly, so sealing the same inputs at the same instant always yields
//! the same bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// UTC instant with one-second resolution.
///
/// # Invariants
/// - Values are explicitly provided by callers.
/// - The value must fall inside the range supported by RFC 3339 rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtcTimestamp(i64);

impl UtcTimestamp {
    /// Creates a timestamp from unix seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Returns the unix seconds value.
    #[must_use]
    pub const fn unix_seconds(self) -> i64 {
        self.0
    }

    /// Renders the timestamp as RFC 3339 (`2026-01-01T00:00:00Z`).
    ///
    /// # Errors
    ///
    /// Returns [`TimeError`] when the value is out of range.
    pub fn to_rfc3339(self) -> Result<String, TimeError> {
        let datetime = self.datetime()?;
        datetime.format(&Rfc3339).map_err(|err| TimeError::Format(err.to_string()))
    }

    /// Renders a filename-safe compact form (`20260101T000000Z`).
    ///
    /// # Errors
    ///
    /// Returns [`TimeError`] when the value is out of range.
    pub fn to_compact(self) -> Result<String, TimeError> {
        let datetime = self.datetime()?;
        Ok(format!(
            "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
            datetime.year(),
            u8::from(datetime.month()),
            datetime.day(),
            datetime.hour(),
            datetime.minute(),
            datetime.second()
        ))
    }

    /// Parses an RFC 3339 string into a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Parse`] when the input is not RFC 3339.
    pub fn parse_rfc3339(value: &str) -> Result<Self, TimeError> {
        let datetime = OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|err| TimeError::Parse(err.to_string()))?;
        Ok(Self(datetime.unix_timestamp()))
    }

    /// Converts to an `OffsetDateTime` in UTC.
    fn datetime(self) -> Result<OffsetDateTime, TimeError> {
        OffsetDateTime::from_unix_timestamp(self.0)
            .map_err(|_| TimeError::OutOfRange(self.0))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Timestamp rendering errors.
#[derive(Debug, Error)]
pub enum TimeError {
    /// Value cannot be represented as a calendar date.
    #[error("timestamp out of range: {0}")]
    OutOfRange(i64),
    /// Formatting failed.
    #[error("timestamp format error: {0}")]
    Format(String),
    /// Parsing failed.
    #[error("timestamp parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_rfc3339_and_compact_forms() {
        let ts = UtcTimestamp::from_unix_seconds(1_767_225_600);
        assert_eq!(ts.to_rfc3339().ok().as_deref(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(ts.to_compact().ok().as_deref(), Some("20260101T000000Z"));
        let parsed = UtcTimestamp::parse_rfc3339("2026-01-01T00:00:00Z").ok();
        assert_eq!(parsed, Some(ts));
    }
}
