//! Calendar timestamps as stored in session documents.
//!
//! Timestamps are written with one-second precision and four-digit years;
//! anything past `9999-12-31T23:59:59Z` is clamped to that instant.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Format used for every stored timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Largest representable instant, `9999-12-31T23:59:59Z`, in unix seconds.
pub const MAX_TIMESTAMP_SECS: i64 = 253_402_300_799;

/// The latest instant a stored timestamp can express.
pub fn max_timestamp() -> DateTime<Utc> {
    Utc.timestamp_opt(MAX_TIMESTAMP_SECS, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Clamp to the representable range and drop sub-second precision.
pub fn clamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp().min(MAX_TIMESTAMP_SECS);
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(max_timestamp)
}

/// Render a timestamp for storage.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    clamp(ts).format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Returns `None` on anything that is not in
/// [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| clamp(naive.and_utc()))
}
