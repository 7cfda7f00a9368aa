use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage. Fixed-width RFC 3339 with millisecond
/// precision, so TEXT comparison in SQL orders the same as the instants.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}
