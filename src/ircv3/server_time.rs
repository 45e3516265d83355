//! Server-time formatting for the IRCv3 server-time capability.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format the current time as an IRCv3 server-time string.
///
/// Returns an ISO 8601 timestamp like `2023-01-01T12:00:00.000Z`.
pub fn format_server_time() -> String {
    format_datetime(&Utc::now())
}

/// Format a Unix timestamp as an IRCv3 server-time string.
pub fn format_timestamp(unix_secs: u64) -> String {
    i64::try_from(unix_secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| format_datetime(&dt))
        .unwrap_or_else(|| "1970-01-01T00:00:00.000Z".to_string())
}

/// Format a timestamp with millisecond precision and a `Z` suffix.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an IRCv3 server-time string.
///
/// Accepts RFC 3339 formatted timestamps like `2023-01-01T12:00:00.000Z`.
pub fn parse_server_time(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
