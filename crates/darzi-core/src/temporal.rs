//! # Temporal Types — UTC-Only Timestamps
//!
//! Defines `Timestamp`, a UTC-only timestamp truncated to whole seconds.
//!
//! ## Invariant
//!
//! Every deadline in the engine (auto-approval windows, dispute SLAs) is
//! computed and compared in UTC at seconds precision. Local offsets or
//! sub-second jitter would make "is this milestone past its deadline"
//! answer differently depending on where or how the value was produced.
//! Non-UTC inputs are rejected at construction — there is no silent
//! conversion on the strict path.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error constructing a [`Timestamp`].
#[derive(Error, Debug)]
pub enum TimestampError {
    /// Input string was not valid RFC 3339 or used a non-UTC offset.
    #[error("invalid timestamp {input:?}: {reason}")]
    Invalid {
        /// The offending input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// A UTC-only timestamp, truncated to seconds precision.
///
/// # Construction
///
/// - [`Timestamp::now()`] — current UTC time, truncated.
/// - [`Timestamp::from_utc()`] — from a `DateTime<Utc>`, truncating sub-seconds.
/// - [`Timestamp::parse()`] — from an RFC 3339 string, rejecting non-`Z` offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp from the current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse a timestamp from an RFC 3339 string.
    ///
    /// **Rejects non-UTC inputs.** Only the `Z` suffix is accepted — even
    /// `+00:00`, which is semantically equivalent, is refused so that all
    /// stored deadline strings have a single canonical form.
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        if !s.ends_with('Z') {
            return Err(TimestampError::Invalid {
                input: s.to_string(),
                reason: "must use Z suffix (UTC only)".to_string(),
            });
        }

        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| TimestampError::Invalid {
            input: s.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Create a timestamp from a Unix epoch timestamp (seconds).
    pub fn from_epoch_secs(secs: i64) -> Result<Self, TimestampError> {
        let dt = DateTime::from_timestamp(secs, 0).ok_or_else(|| TimestampError::Invalid {
            input: secs.to_string(),
            reason: "out of range for Unix timestamp".to_string(),
        })?;
        Ok(Self(dt))
    }

    /// The timestamp `hours` hours after this one.
    ///
    /// Used for auto-approval deadlines (`submitted + 48h`) and dispute
    /// SLA deadlines (`opened + priority hours`).
    pub fn plus_hours(&self, hours: i64) -> Self {
        Self(self.0 + Duration::hours(hours))
    }

    /// The timestamp `minutes` minutes after this one.
    pub fn plus_minutes(&self, minutes: i64) -> Self {
        Self(self.0 + Duration::minutes(minutes))
    }

    /// Whole minutes elapsed from `earlier` to `self` (zero if negative).
    pub fn minutes_since(&self, earlier: Timestamp) -> i64 {
        (self.0 - earlier.0).num_minutes().max(0)
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the Unix epoch timestamp in seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Render as ISO 8601 with Z suffix (e.g., `2026-03-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Truncate a `DateTime<Utc>` to seconds precision (discard nanoseconds).
fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_has_no_subseconds() {
        let ts = Timestamp::now();
        assert_eq!(ts.as_datetime().nanosecond(), 0);
    }

    #[test]
    fn test_from_utc_truncates() {
        let dt = Utc.with_ymd_and_hms(2026, 3, 15, 12, 30, 45).unwrap();
        let dt_with_nanos = dt.with_nanosecond(123_456_789).unwrap();
        let ts = Timestamp::from_utc(dt_with_nanos);
        assert_eq!(ts.to_iso8601(), "2026-03-15T12:30:45Z");
    }

    #[test]
    fn test_parse_z_suffix_accepted() {
        let ts = Timestamp::parse("2026-03-15T12:00:00Z").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-03-15T12:00:00Z");
    }

    #[test]
    fn test_parse_offset_rejected() {
        assert!(Timestamp::parse("2026-03-15T12:00:00+00:00").is_err());
        assert!(Timestamp::parse("2026-03-15T17:00:00+05:00").is_err());
        assert!(Timestamp::parse("not-a-date").is_err());
    }

    #[test]
    fn test_plus_hours_deadline() {
        let submitted = Timestamp::parse("2026-03-15T12:00:00Z").unwrap();
        let deadline = submitted.plus_hours(48);
        assert_eq!(deadline.to_iso8601(), "2026-03-17T12:00:00Z");
        assert!(deadline > submitted);
    }

    #[test]
    fn test_minutes_since() {
        let opened = Timestamp::parse("2026-03-15T12:00:00Z").unwrap();
        let later = Timestamp::parse("2026-03-15T13:30:00Z").unwrap();
        assert_eq!(later.minutes_since(opened), 90);
        // Clamped to zero in the other direction.
        assert_eq!(opened.minutes_since(later), 0);
    }

    #[test]
    fn test_ordering_is_total() {
        let a = Timestamp::parse("2026-03-15T12:00:00Z").unwrap();
        let b = Timestamp::parse("2026-03-15T12:00:01Z").unwrap();
        assert!(a < b);
        assert_eq!(a.max(b), b);
    }

    #[test]
    fn test_epoch_roundtrip() {
        let ts = Timestamp::parse("2026-03-15T12:00:00Z").unwrap();
        let ts2 = Timestamp::from_epoch_secs(ts.epoch_secs()).unwrap();
        assert_eq!(ts, ts2);
    }

    #[test]
    fn test_serde_roundtrip() {
        let ts = Timestamp::parse("2026-03-15T12:00:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ts);
    }
}
