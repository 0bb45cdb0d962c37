//! Timestamp encoding for the state file
//!
//! Written as RFC 3339 in UTC. Older state files carry naive ISO-8601
//! timestamps without an offset; those are read as UTC.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(dt) => serializer.serialize_str(&format(dt)),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse("2025-03-01T10:15:30Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 30).unwrap());
    }

    #[test]
    fn test_parse_offset_is_normalised() {
        let dt = parse("2025-03-01T12:15:30+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 30).unwrap());
    }

    #[test]
    fn test_parse_naive_as_utc() {
        let dt = parse("2025-03-01T10:15:30.250000").unwrap();
        assert_eq!(dt.timestamp_subsec_millis(), 250);
        assert_eq!(dt.timestamp(), Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 30).unwrap().timestamp());

        assert!(parse("2025-03-01T10:15:30").is_some());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse("yesterday").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn test_format_round_trips_subsecond_precision() {
        let dt = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(parse(&format(&dt)), Some(dt));
    }
}
