//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Render a timestamp as ISO-8601 UTC with millisecond precision and a `Z` suffix
/// (e.g. `2025-01-31T12:00:00.000Z`), the format reasoning payloads and feedback
/// reasons use.
pub fn to_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
