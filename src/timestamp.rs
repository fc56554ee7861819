//! Unix timestamps for ledger entries and guard windows.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
///
/// Serialized as a stringified integer. Deserialization accepts either a
/// string or a bare integer so both wire styles round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnixTimestamp(u64);

impl UnixTimestamp {
    pub fn from_secs(secs: u64) -> Self {
        UnixTimestamp(secs)
    }

    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch");
        UnixTimestamp(duration.as_secs())
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Timestamp `secs` earlier, clamped at the epoch. Guard windows use this
    /// to derive their cutoff.
    pub fn saturating_sub(&self, secs: u64) -> Self {
        UnixTimestamp(self.0.saturating_sub(secs))
    }
}

impl fmt::Display for UnixTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for UnixTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct UnixTimestampVisitor;

impl Visitor<'_> for UnixTimestampVisitor {
    type Value = UnixTimestamp;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("seconds since the Unix epoch as a string or integer")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let secs = v.parse::<u64>().map_err(de::Error::custom)?;
        Ok(UnixTimestamp(secs))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(UnixTimestamp(v))
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(UnixTimestampVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization() {
        let timestamp = UnixTimestamp::from_secs(1700000000);
        let json = serde_json::to_string(&timestamp).unwrap();
        assert_eq!(json, "\"1700000000\"");
        let parsed: UnixTimestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, timestamp);
        let from_int: UnixTimestamp = serde_json::from_str("1700000000").unwrap();
        assert_eq!(from_int, timestamp);
    }

    #[test]
    fn test_saturating_sub() {
        let timestamp = UnixTimestamp::from_secs(100);
        assert_eq!(timestamp.saturating_sub(30).as_secs(), 70);
        assert_eq!(timestamp.saturating_sub(500).as_secs(), 0);
    }

    #[test]
    fn test_ordering() {
        assert!(UnixTimestamp::from_secs(10) < UnixTimestamp::from_secs(20));
    }
}
