//! Timestamps carried by boards, columns, tasks, subtasks and comments.
//!
//! A value that reads as a date becomes a UTC instant at millisecond
//! precision. Text that cannot be read as a date under any accepted form is
//! kept verbatim, so a load never drops stored data.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::de::value::{MapAccessDeserializer, SeqAccessDeserializer};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Naive date-time layouts accepted after strict RFC 3339 fails.
/// Offset-less values are read as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Timestamp {
    At(DateTime<Utc>),
    /// Stored text that no accepted format could read.
    Unparsed(String),
}

impl Timestamp {
    /// Current time, truncated to milliseconds so it survives encoding exactly.
    pub fn now() -> Self {
        Self::At(truncate_millis(Utc::now()))
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::At(truncate_millis(dt))
    }

    /// Epoch milliseconds. Out-of-range values are kept as their decimal text.
    pub fn from_millis(ms: i64) -> Self {
        match DateTime::from_timestamp_millis(ms) {
            Some(dt) => Self::At(dt),
            None => Self::Unparsed(ms.to_string()),
        }
    }

    /// Strict ISO-8601 first, then the permissive forms, then raw text.
    pub fn parse(text: &str) -> Self {
        if let Some(dt) = parse_strict(text) {
            return Self::At(dt);
        }
        if let Some(dt) = parse_permissive(text) {
            return Self::At(dt);
        }
        Self::Unparsed(text.to_string())
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(dt) => Some(*dt),
            Self::Unparsed(_) => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::At(_))
    }

    pub fn timestamp_millis(&self) -> Option<i64> {
        self.as_datetime().map(|dt| dt.timestamp_millis())
    }

    /// `2024-01-15T10:30:00.000Z` for parsed values, the raw text otherwise.
    pub fn to_iso_string(&self) -> String {
        match self {
            Self::At(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            Self::Unparsed(raw) => raw.clone(),
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso_string())
    }
}

fn truncate_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

/// RFC 3339 with a mandatory offset.
pub fn parse_strict(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| truncate_millis(dt.with_timezone(&Utc)))
}

/// Looser readings: RFC 2822, offset-less date-times, bare dates and
/// integer epoch milliseconds.
pub fn parse_permissive(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(truncate_millis(dt.with_timezone(&Utc)));
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(truncate_millis(naive.and_utc()));
        }
    }

    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis);
    }

    None
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_iso_string())
    }
}

struct TimestampVisitor;

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a timestamp")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Timestamp, E> {
        Ok(Timestamp::parse(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
        Ok(Timestamp::from_millis(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
        match i64::try_from(v) {
            Ok(ms) => Ok(Timestamp::from_millis(ms)),
            Err(_) => Ok(Timestamp::Unparsed(v.to_string())),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Timestamp, E> {
        if v.is_finite() {
            Ok(Timestamp::from_millis(v.trunc() as i64))
        } else {
            Ok(Timestamp::Unparsed(v.to_string()))
        }
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Timestamp, E> {
        Ok(Timestamp::Unparsed(v.to_string()))
    }

    /// A required timestamp stored as null. Optional fields never get here.
    fn visit_unit<E: de::Error>(self) -> Result<Timestamp, E> {
        log::warn!("[taskboard.temporal] Null timestamp, using the current time");
        Ok(Timestamp::now())
    }

    fn visit_none<E: de::Error>(self) -> Result<Timestamp, E> {
        self.visit_unit()
    }

    // Structured values are kept as their JSON text
    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Timestamp, A::Error> {
        let value = serde_json::Value::deserialize(MapAccessDeserializer::new(map))?;
        Ok(Timestamp::Unparsed(value.to_string()))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Timestamp, A::Error> {
        let value = serde_json::Value::deserialize(SeqAccessDeserializer::new(seq))?;
        Ok(Timestamp::Unparsed(value.to_string()))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(TimestampVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_strict_iso_parses() {
        let ts = Timestamp::parse("2024-01-15T10:30:00.123Z");
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(ts, Timestamp::At(expected));
    }

    #[test]
    fn test_offset_normalized_to_utc() {
        let ts = Timestamp::parse("2024-01-15T12:30:00+02:00");
        assert_eq!(ts.to_iso_string(), "2024-01-15T10:30:00.000Z");
    }

    #[test]
    fn test_permissive_fallbacks() {
        assert_eq!(
            Timestamp::parse("2024-03-01").to_iso_string(),
            "2024-03-01T00:00:00.000Z"
        );
        assert_eq!(
            Timestamp::parse("2024-03-01 08:15").to_iso_string(),
            "2024-03-01T08:15:00.000Z"
        );
        assert_eq!(
            Timestamp::parse("Fri, 01 Mar 2024 08:15:00 +0000").to_iso_string(),
            "2024-03-01T08:15:00.000Z"
        );
        assert_eq!(
            Timestamp::parse("1700000000000").to_iso_string(),
            "2023-11-14T22:13:20.000Z"
        );
    }

    #[test]
    fn test_garbage_kept_raw() {
        let ts = Timestamp::parse("next tuesday-ish");
        assert_eq!(ts, Timestamp::Unparsed("next tuesday-ish".to_string()));
        assert!(!ts.is_parsed());
        assert_eq!(ts.to_iso_string(), "next tuesday-ish");
    }

    #[test]
    fn test_now_has_millisecond_precision() {
        let ts = Timestamp::now();
        let dt = ts.as_datetime().unwrap();
        assert_eq!(dt.timestamp_subsec_nanos() % 1_000_000, 0);
        assert_eq!(Timestamp::parse(&ts.to_iso_string()), ts);
    }

    #[test]
    fn test_serde_never_rejects_odd_values() {
        let null: Timestamp = serde_json::from_str("null").unwrap();
        assert!(null.is_parsed());

        let flag: Timestamp = serde_json::from_str("true").unwrap();
        assert_eq!(flag, Timestamp::Unparsed("true".to_string()));

        let obj: Timestamp = serde_json::from_str(r#"{"ms": 5}"#).unwrap();
        assert_eq!(obj, Timestamp::Unparsed(r#"{"ms":5}"#.to_string()));

        let list: Timestamp = serde_json::from_str("[2024, 1]").unwrap();
        assert_eq!(list.to_iso_string(), "[2024,1]");

        // Optional fields still read null as absent
        let missing: Option<Timestamp> = serde_json::from_str("null").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_serde_accepts_numbers_and_strings() {
        let from_num: Timestamp = serde_json::from_str("1700000000000").unwrap();
        let from_str: Timestamp = serde_json::from_str("\"2023-11-14T22:13:20Z\"").unwrap();
        assert_eq!(from_num, from_str);
        assert_eq!(
            serde_json::to_string(&from_num).unwrap(),
            "\"2023-11-14T22:13:20.000Z\""
        );
    }
}
