//! ISO-8601 timestamps as they travel over the wire.
//!
//! The raw string is kept verbatim so that a job document round-trips
//! through load and save unchanged. Ordering is only needed for the
//! `updated_at` staleness check and is computed on demand.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

/// Last millisecond value handed out by [`Timestamp::now`]
static LAST_ISSUED_MS: AtomicI64 = AtomicI64::new(0);

/// A timestamp string such as `2024-03-01T12:00:00.000Z`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Wrap a raw timestamp string without validating it
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// A fresh, process-unique creation timestamp.
    ///
    /// Two calls never return the same value, even within one millisecond,
    /// so a duplicate can never share `created` with its source.
    pub fn now() -> Self {
        let now = Utc::now().timestamp_millis();
        let mut last = LAST_ISSUED_MS.load(AtomicOrdering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_ISSUED_MS.compare_exchange_weak(
                last,
                next,
                AtomicOrdering::SeqCst,
                AtomicOrdering::Relaxed,
            ) {
                Ok(_) => return Self::from_millis(next),
                Err(actual) => last = actual,
            }
        }
    }

    fn from_millis(ms: i64) -> Self {
        let at = Utc
            .timestamp_millis_opt(ms)
            .single()
            .unwrap_or_else(Utc::now);
        Self::from(at)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into UTC. Accepts RFC 3339 and naive ISO strings (read as UTC).
    pub fn parse(&self) -> Option<DateTime<Utc>> {
        if let Ok(at) = DateTime::parse_from_rfc3339(&self.0) {
            return Some(at.with_timezone(&Utc));
        }

        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(&self.0, format).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    /// Chronological comparison, falling back to string order when either
    /// side cannot be parsed.
    pub fn chrono_cmp(&self, other: &Timestamp) -> Ordering {
        match (self.parse(), other.parse()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.0.cmp(&other.0),
        }
    }

    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.chrono_cmp(other) == Ordering::Greater
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_unique_and_increasing() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert_ne!(a, b);
        assert!(b.is_after(&a));
    }

    #[test]
    fn formats_like_iso_string() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(Timestamp::from(at).as_str(), "2024-03-01T12:00:00.000Z");
    }

    #[test]
    fn parses_naive_server_timestamps_as_utc() {
        let naive = Timestamp::new("2024-03-01T12:00:00.250000");
        let zoned = Timestamp::new("2024-03-01T12:00:00.100Z");
        assert!(naive.is_after(&zoned));
        assert!(!zoned.is_after(&naive));
    }

    #[test]
    fn equal_instants_are_not_after_each_other() {
        let a = Timestamp::new("2024-03-01T12:00:00Z");
        let b = Timestamp::new("2024-03-01T14:00:00+02:00");
        assert_eq!(a.chrono_cmp(&b), Ordering::Equal);
        assert!(!a.is_after(&b));
    }
}
