//! Timestamp representations that arrive from outside the store.
//!
//! Coupon validity windows are written by several producers: admin tooling
//! emits serialized `{seconds, nanoseconds}` objects, checkout code emits
//! millisecond epochs, and hand-edited records carry strings. Every form is
//! captured by [`TimestampRepr`] and normalised exactly once, at the point the
//! record is decoded from storage.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Every accepted on-the-wire shape of a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampRepr {
  /// `{"seconds": .., "nanoseconds": ..}`; the underscore-prefixed field
  /// names used by some exporters are accepted too.
  Serialized {
    #[serde(alias = "_seconds")]
    seconds:     i64,
    #[serde(alias = "_nanoseconds", default)]
    nanoseconds: u32,
  },
  /// Milliseconds since the Unix epoch.
  Millis(i64),
  /// RFC 3339, a bare `YYYY-MM-DD` date, or a `YYYY-MM-DDTHH:MM` local form
  /// (interpreted as UTC).
  Text(String),
}

impl TimestampRepr {
  /// Resolve to a UTC instant.
  pub fn normalize(&self) -> Result<DateTime<Utc>> {
    match self {
      Self::Serialized { seconds, nanoseconds } => Utc
        .timestamp_opt(*seconds, *nanoseconds)
        .single()
        .ok_or_else(|| Error::InvalidTimestamp(format!("{seconds}s {nanoseconds}ns"))),
      Self::Millis(ms) => DateTime::from_timestamp_millis(*ms)
        .ok_or_else(|| Error::InvalidTimestamp(format!("{ms}ms"))),
      Self::Text(s) => parse_text(s),
    }
  }
}

impl From<DateTime<Utc>> for TimestampRepr {
  fn from(dt: DateTime<Utc>) -> Self { Self::Text(dt.to_rfc3339()) }
}

fn parse_text(s: &str) -> Result<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M") {
    return Ok(naive.and_utc());
  }
  if let Some(midnight) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
  {
    return Ok(midnight.and_utc());
  }
  Err(Error::InvalidTimestamp(s.to_owned()))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn decode(json: &str) -> TimestampRepr { serde_json::from_str(json).unwrap() }

  #[test]
  fn serialized_object_forms() {
    let expected = Utc.timestamp_opt(1_700_000_000, 500).unwrap();
    let a = decode(r#"{"seconds":1700000000,"nanoseconds":500}"#);
    let b = decode(r#"{"_seconds":1700000000,"_nanoseconds":500}"#);
    assert_eq!(a.normalize().unwrap(), expected);
    assert_eq!(b.normalize().unwrap(), expected);
  }

  #[test]
  fn millis_form() {
    let t = decode("1700000000123");
    assert_eq!(t.normalize().unwrap().timestamp_millis(), 1_700_000_000_123);
  }

  #[test]
  fn text_forms() {
    let rfc = decode(r#""2024-03-01T10:00:00+02:00""#);
    assert_eq!(
      rfc.normalize().unwrap(),
      Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    );

    let local = decode(r#""2024-03-01T10:30""#);
    assert_eq!(
      local.normalize().unwrap(),
      Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
    );

    let date = decode(r#""2024-03-01""#);
    assert_eq!(
      date.normalize().unwrap(),
      Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    );
  }

  #[test]
  fn garbage_text_is_rejected() {
    assert!(matches!(
      decode(r#""next tuesday""#).normalize(),
      Err(Error::InvalidTimestamp(_))
    ));
  }

  #[test]
  fn from_datetime_roundtrips() {
    let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(TimestampRepr::from(now).normalize().unwrap(), now);
  }
}
