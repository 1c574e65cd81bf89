use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors returned when parsing a trace or span id from its hex form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdParseError {
    /// The input was empty or longer than the id allows.
    #[error("id has invalid length {0}")]
    Length(usize),

    /// The input contained a non-hexadecimal character.
    #[error("id contains non-hex characters")]
    NonHex,
}

/// A 128-bit trace identifier, stored as two unsigned 64-bit halves.
///
/// The all-zero id is reserved as the "absent" sentinel: readers use it to
/// probe for not-found behavior and writers never emit it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId {
    pub high: u64,
    pub low: u64,
}

impl TraceId {
    /// The reserved all-zero id.
    pub const ZERO: TraceId = TraceId { high: 0, low: 0 };

    pub fn new(high: u64, low: u64) -> Self {
        TraceId { high, low }
    }

    /// Whether this is the reserved "absent" sentinel.
    pub fn is_zero(&self) -> bool {
        self.high == 0 && self.low == 0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.high, self.low)
    }
}

impl FromStr for TraceId {
    type Err = IdParseError;

    /// Accepts up to 32 hex digits. Inputs of 16 digits or fewer populate
    /// only the low half, matching the short form emitted by older clients.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 32 {
            return Err(IdParseError::Length(s.len()));
        }
        if s.len() <= 16 {
            let low = u64::from_str_radix(s, 16).map_err(|_| IdParseError::NonHex)?;
            return Ok(TraceId { high: 0, low });
        }
        let (hi, lo) = s.split_at(s.len() - 16);
        let high = u64::from_str_radix(hi, 16).map_err(|_| IdParseError::NonHex)?;
        let low = u64::from_str_radix(lo, 16).map_err(|_| IdParseError::NonHex)?;
        Ok(TraceId { high, low })
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A 64-bit span identifier, unique within its trace. Zero is reserved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpanId(pub u64);

impl SpanId {
    /// The reserved all-zero id.
    pub const ZERO: SpanId = SpanId(0);

    pub fn new(id: u64) -> Self {
        SpanId(id)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 16 {
            return Err(IdParseError::Length(s.len()));
        }
        u64::from_str_radix(s, 16)
            .map(SpanId)
            .map_err(|_| IdParseError::NonHex)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpanId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_roundtrips_through_hex() {
        let id = TraceId::new(0x1234_5678_9abc_def0, 0x0fed_cba9_8765_4321);
        let rendered = id.to_string();
        assert_eq!(rendered, "123456789abcdef00fedcba987654321");
        assert_eq!(rendered.parse::<TraceId>().unwrap(), id);
    }

    #[test]
    fn short_trace_id_populates_low_half() {
        let id: TraceId = "beef".parse().unwrap();
        assert_eq!(id, TraceId::new(0, 0xbeef));
    }

    #[test]
    fn zero_is_sentinel() {
        assert!(TraceId::ZERO.is_zero());
        assert!(SpanId::ZERO.is_zero());
        assert!(!TraceId::new(0, 1).is_zero());
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!("".parse::<TraceId>(), Err(IdParseError::Length(0)));
        assert_eq!("zz".parse::<SpanId>(), Err(IdParseError::NonHex));
        assert!("0".repeat(33).parse::<TraceId>().is_err());
    }

    #[test]
    fn ids_serialize_as_hex_strings() {
        let json = serde_json::to_string(&SpanId::new(0x2a)).unwrap();
        assert_eq!(json, "\"000000000000002a\"");
        let back: SpanId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SpanId::new(0x2a));
    }
}
