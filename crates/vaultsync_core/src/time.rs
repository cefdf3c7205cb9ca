//! UTC instants.

use crate::error::TimestampError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A UTC instant as reported by the source repository or stored as
/// destination metadata.
///
/// Parsing accepts RFC 3339, naive date-times and bare dates; values
/// without an offset are interpreted as UTC. Rendering is always RFC 3339
/// with millisecond precision and a `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current instant.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wraps a chrono date-time.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parses a timestamp string.
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self(Utc.from_utc_datetime(&naive)));
            }
        }
        if let Some(naive) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Ok(Self(Utc.from_utc_datetime(&naive)));
        }
        Err(TimestampError(s.to_string()))
    }

    /// Returns the underlying date-time.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Canonical RFC 3339 rendering.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Compact form used to name per-run ledger directories.
    pub fn run_id(&self) -> String {
        self.0.format("%Y%m%dT%H%M%SZ").to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.to_rfc3339()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repository_formats() {
        let zulu = Timestamp::parse("2018-05-02T17:07:29.028Z").unwrap();
        assert_eq!(zulu.to_rfc3339(), "2018-05-02T17:07:29.028Z");

        let offset = Timestamp::parse("2018-05-02T19:07:29.028+02:00").unwrap();
        assert_eq!(offset, zulu);

        let naive = Timestamp::parse("2018-02-05T06:45:23.422720").unwrap();
        assert_eq!(naive.to_rfc3339(), "2018-02-05T06:45:23.422Z");

        let no_fraction = Timestamp::parse("2018-02-05 06:45:23").unwrap();
        assert_eq!(no_fraction.to_rfc3339(), "2018-02-05T06:45:23.000Z");

        let date = Timestamp::parse("2024-01-02").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-01-02T00:00:00.000Z");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Timestamp::parse("yesterday").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn ordering_follows_instants() {
        let a = Timestamp::parse("2024-01-01").unwrap();
        let b = Timestamp::parse("2024-01-02").unwrap();
        assert!(b > a);
        assert_eq!(a, Timestamp::parse("2024-01-01T00:00:00Z").unwrap());
    }

    #[test]
    fn run_id_is_compact() {
        let ts = Timestamp::parse("2024-03-04T05:06:07Z").unwrap();
        assert_eq!(ts.run_id(), "20240304T050607Z");
    }

    #[test]
    fn serde_uses_rfc3339() {
        let ts = Timestamp::parse("2024-01-02").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-01-02T00:00:00.000Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
