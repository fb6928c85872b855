//! Common types and utilities shared across models.

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp the way it is stored: UTC, second precision, `Z` suffix.
/// Stored timestamps compare lexically in chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// SQLite stores booleans as integers
pub fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
