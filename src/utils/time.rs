/// Time utility functions
///
/// All timestamps that leave the process (history rows, request files,
/// listener responses) are RFC 3339 UTC strings with second precision.
use chrono::{DateTime, Utc};

/// Generate current UTC timestamp in RFC 3339 format.
///
/// # Format
/// RFC 3339: "2025-12-17T02:30:00Z"
pub fn now_utc() -> String {
    format_utc(Utc::now())
}

/// Parse RFC 3339 timestamp and convert to UTC DateTime.
pub fn parse_to_utc(timestamp: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid timestamp '{}': {}", timestamp, e))
}

/// Format DateTime<Utc> to RFC 3339 string.
pub fn format_utc(datetime: DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Short `YYYY-MM-DD HH:MM` rendering for human-facing listings.
///
/// Falls back to the raw input if it is not a valid timestamp.
pub fn display_minutes(timestamp: &str) -> String {
    parse_to_utc(timestamp)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}
