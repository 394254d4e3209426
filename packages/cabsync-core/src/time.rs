use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// Wall-clock timestamp carried by every node.
pub type Timestamp = DateTime<Utc>;

/// Current UTC time truncated to whole seconds. The persisted format keeps
/// second precision, so in-memory timestamps are kept at that precision too
/// and round-trip exactly.
pub fn now() -> Timestamp {
    from_unix(Utc::now().timestamp())
}

/// Build a second-precision timestamp from a Unix epoch value.
pub fn from_unix(secs: i64) -> Timestamp {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

pub fn format(t: Timestamp) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse(s: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| from_unix(t.timestamp()))
        .map_err(|e| Error::Format(format!("unparsable timestamp '{s}': {e}")))
}
