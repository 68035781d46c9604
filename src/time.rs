//! Time utilities shared by the signing and verification paths.

use chrono::Utc;

/// DateTime in UTC.
pub type DateTime = chrono::DateTime<Utc>;

/// Get the current time in UTC.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format a datetime as a compact date: `20220313`.
pub fn format_date(t: DateTime) -> String {
    t.format("%Y%m%d").to_string()
}

/// Format a datetime as compact ISO 8601: `20220313T072004Z`.
pub fn format_iso8601(t: DateTime) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}
