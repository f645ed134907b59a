//! JSON-serializable millisecond timestamp.

use chrono::{DateTime, TimeZone, Utc};

/// A Unix-epoch millisecond timestamp that serializes as a bare JSON number.
///
/// Every `ts_ms` field in the wire protocol goes through this type so call
/// sites never reach for `chrono::Utc::now()` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Millis(DateTime<Utc>);

impl Millis {
    pub fn now() -> Self {
        Millis(Utc::now())
    }

    pub fn as_i64(self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl From<i64> for Millis {
    fn from(v: i64) -> Self {
        Millis(Utc.timestamp_millis_opt(v).single().unwrap_or_default())
    }
}

impl serde::Serialize for Millis {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> serde::Deserialize<'de> for Millis {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = i64::deserialize(deserializer)?;
        Ok(Millis::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_positive_and_monotonic_enough() {
        let a = Millis::now();
        let b = Millis::now();
        assert!(a.as_i64() > 0);
        assert!(b.as_i64() >= a.as_i64());
    }

    #[test]
    fn serializes_as_bare_number() {
        let m = Millis::from(1_700_000_000_000);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "1700000000000");
    }

    #[test]
    fn round_trips_through_i64() {
        let m = Millis::from(1_700_000_000_123);
        assert_eq!(m.as_i64(), 1_700_000_000_123);
    }
}
