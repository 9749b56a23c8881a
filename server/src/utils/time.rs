//! Timestamp conversions between wire nanoseconds, `time`, and `chrono`

use chrono::{DateTime, Utc};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const SQL_TIMESTAMP_FORMAT: &[BorrowedFormatItem<'_>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]"
);

/// Convert unix nanoseconds to a UTC timestamp.
///
/// Zero (unset in OTLP payloads) and out-of-range values map to the epoch.
pub fn datetime_from_unix_nanos(nanos: u64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Unix nanoseconds of a timestamp (for parameter binding)
pub fn unix_nanos(dt: OffsetDateTime) -> i64 {
    dt.unix_timestamp_nanos() as i64
}

/// Convert a chrono DateTime to a time OffsetDateTime
pub fn chrono_to_time(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(dt.timestamp_nanos_opt().unwrap_or(0) as i128)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Format a timestamp for a DuckDB TIMESTAMP column (microsecond precision)
pub fn format_sql_timestamp(dt: OffsetDateTime) -> String {
    dt.format(SQL_TIMESTAMP_FORMAT).unwrap_or_default()
}
