// crates/waterline-core/src/core/time.rs
// ============================================================================
// Module: Waterline Time Model
// Description: Canonical timestamp representation for rows and snapshots.
// Purpose: Provide RFC 3339 UTC timestamps with age arithmetic for freshness checks.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! All persisted timestamps are RFC 3339 with an explicit UTC offset. The
//! runtime reads wall-clock time once per externally visible mutation and
//! threads the value through, so tests can pin time explicitly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used for entity rows, snapshots, and run records.
///
/// # Invariants
/// - Always carries an explicit offset; values are normalized to UTC.
/// - Serializes as an RFC 3339 string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Timestamp {
    /// Returns the current wall-clock time in UTC.
    #[must_use]
    pub fn now_utc() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Creates a timestamp from an existing datetime, normalized to UTC.
    #[must_use]
    pub fn from_datetime(value: OffsetDateTime) -> Self {
        Self(value.to_offset(time::UtcOffset::UTC))
    }

    /// Creates a timestamp from unix seconds (returns `None` when out of range).
    #[must_use]
    pub fn from_unix_seconds(seconds: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp(seconds).ok().map(Self)
    }

    /// Parses an RFC 3339 timestamp (returns `None` on invalid input).
    #[must_use]
    pub fn parse_rfc3339(raw: &str) -> Option<Self> {
        OffsetDateTime::parse(raw.trim(), &Rfc3339).ok().map(Self::from_datetime)
    }

    /// Formats the timestamp as an RFC 3339 string.
    #[must_use]
    pub fn format_rfc3339(&self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| format!("{}", self.0.unix_timestamp()))
    }

    /// Returns the underlying datetime.
    #[must_use]
    pub const fn as_datetime(&self) -> OffsetDateTime {
        self.0
    }

    /// Returns the age of this timestamp in fractional hours relative to `now`.
    ///
    /// Negative values mean the timestamp lies in the future of `now`.
    #[must_use]
    pub fn age_hours_at(&self, now: Self) -> f64 {
        (now.0 - self.0).as_seconds_f64() / 3600.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}
