//! Timezone-naive instant handling
//!
//! All accounting comparisons are timezone-naive: an embedded zone offset is
//! discarded at ingestion and the wall-clock value is kept as written. This
//! mirrors the upstream control plane, which reports `started_at` without a
//! reliable zone.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{CumuloError, Result};

/// Accepted instant layouts, tried in order after RFC 3339
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Wire layout for `started_at` fields (microsecond precision, no zone)
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Parse an instant, discarding any zone offset.
///
/// Accepts RFC 3339 (`2024-05-01T12:00:00+02:00`, offset dropped), the
/// zone-less layouts above, and bare dates (interpreted as midnight).
pub fn parse_instant(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();

    if let Ok(with_zone) = DateTime::parse_from_rfc3339(s) {
        // keep the wall-clock value as written, not the UTC equivalent
        return Ok(with_zone.naive_local());
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(parsed);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight);
        }
    }

    Err(CumuloError::Config(format!("Unrecognized instant: '{s}'")))
}

/// Epoch seconds of a naive instant, read as UTC wall time.
///
/// Weight tier activations are keyed by epoch seconds; this is the single
/// place the naive convention is anchored to an epoch.
pub fn epoch_seconds(t: NaiveDateTime) -> i64 {
    t.and_utc().timestamp()
}

/// Format an instant the way the control plane writes `started_at`
pub fn format_wire(t: NaiveDateTime) -> String {
    t.format(WIRE_FORMAT).to_string()
}
