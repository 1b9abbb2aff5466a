// crates/photopipe-core/src/core/time.rs
// ============================================================================
// Module: Photopipe Time Model
// Description: Canonical timestamp representation for observations and claims.
// Purpose: Provide explicit, comparable time values across Photopipe records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Photopipe stores every timestamp as unix seconds. Observation times
//! (`date_obs`), processing times (`date_proc`), and claim times are all
//! caller-supplied [`ObsTimestamp`] values; the core never reads wall-clock
//! time itself, which keeps nearest-in-time queries and stale-claim checks
//! replayable in tests. Conversion helpers parse the date/time text forms
//! the external solver emits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use time::PrimitiveDateTime;
use time::Time;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used in Photopipe records, as unix epoch seconds (UTC).
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads
///   wall-clock time.
/// - Ordering and distance comparisons are plain integer arithmetic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ObsTimestamp(i64);

impl ObsTimestamp {
    /// Creates a timestamp from unix epoch seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Returns the timestamp as unix epoch seconds.
    #[must_use]
    pub const fn unix_seconds(self) -> i64 {
        self.0
    }

    /// Returns the absolute distance to another timestamp in seconds.
    #[must_use]
    pub const fn abs_distance(self, other: Self) -> i64 {
        (self.0 - other.0).abs()
    }

    /// Composes a timestamp from separate solver date and time fields.
    ///
    /// Accepts `YYYY-MM-DD` and `HH:MM:SS` and interprets the pair as UTC,
    /// matching how the external astrometric solver reports processing time.
    ///
    /// # Errors
    ///
    /// Returns [`TimeParseError`] when either field does not match its
    /// expected format.
    pub fn from_date_and_time(date: &str, clock: &str) -> Result<Self, TimeParseError> {
        let date_format = time::macros::format_description!("[year]-[month]-[day]");
        let time_format = time::macros::format_description!("[hour]:[minute]:[second]");
        let parsed_date = Date::parse(date, &date_format)
            .map_err(|err| TimeParseError::Malformed(format!("date {date:?}: {err}")))?;
        let parsed_time = Time::parse(clock, &time_format)
            .map_err(|err| TimeParseError::Malformed(format!("time {clock:?}: {err}")))?;
        let datetime = PrimitiveDateTime::new(parsed_date, parsed_time);
        Ok(Self(datetime.assume_utc().unix_timestamp()))
    }

    /// Parses an RFC 3339 timestamp (the form acquisition hardware reports).
    ///
    /// # Errors
    ///
    /// Returns [`TimeParseError`] when the value is not valid RFC 3339.
    pub fn from_rfc3339(value: &str) -> Result<Self, TimeParseError> {
        let parsed = time::OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|err| TimeParseError::Malformed(format!("timestamp {value:?}: {err}")))?;
        Ok(Self(parsed.unix_timestamp()))
    }
}

impl fmt::Display for ObsTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Timestamp parse errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    /// Input text did not match the expected format.
    #[error("malformed timestamp: {0}")]
    Malformed(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::ObsTimestamp;

    #[test]
    fn composes_solver_date_and_time_as_utc() {
        let ts = ObsTimestamp::from_date_and_time("2024-03-01", "12:00:00").unwrap();
        assert_eq!(ts.unix_seconds(), 1_709_294_400);
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(ObsTimestamp::from_date_and_time("03/01/2024", "12:00:00").is_err());
        assert!(ObsTimestamp::from_date_and_time("2024-03-01", "noon").is_err());
    }

    #[test]
    fn abs_distance_is_symmetric() {
        let a = ObsTimestamp::from_unix_seconds(100);
        let b = ObsTimestamp::from_unix_seconds(250);
        assert_eq!(a.abs_distance(b), 150);
        assert_eq!(b.abs_distance(a), 150);
    }
}
