//! Opaque document identifiers.
//!
//! Every document is addressed by a 24-character lowercase hex string. IDs
//! are generated from random bytes and validated on every request boundary
//! before a query runs.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A 24-hex-character document identifier.
///
/// Stored as the raw 12 bytes; formats as lowercase hex. References between
/// documents are weak: an `ObjectId` carries no guarantee that the target
/// still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

/// Error returned when a string is not a well-formed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidId;

impl fmt::Display for InvalidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "identifier must be 24 lowercase hex characters")
    }
}

impl std::error::Error for InvalidId {}

impl ObjectId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        let uuid = Uuid::new_v4();
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&uuid.as_bytes()[..12]);
        Self(bytes)
    }

    /// Parse and validate a request-supplied identifier.
    pub fn parse(input: &str) -> Result<Self, InvalidId> {
        if input.len() != 24 {
            return Err(InvalidId);
        }
        let mut bytes = [0u8; 12];
        for (i, chunk) in input.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| InvalidId)?;
            if pair.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(InvalidId);
            }
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| InvalidId)?;
        }
        Ok(Self(bytes))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for ObjectId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

impl From<ObjectId> for serde_json::Value {
    fn from(id: ObjectId) -> Self {
        serde_json::Value::String(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        let text = a.to_string();
        assert_eq!(text.len(), 24);
        assert_eq!(ObjectId::parse(&text), Ok(a));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(ObjectId::parse("").is_err());
        assert!(ObjectId::parse("123").is_err());
        assert!(ObjectId::parse("zzzzzzzzzzzzzzzzzzzzzzzz").is_err());
        assert!(ObjectId::parse("ABCDEFABCDEFABCDEFABCDEF").is_err());
        assert!(ObjectId::parse("0123456789abcdef0123456789abcdef").is_err());
    }

    #[test]
    fn serde_round_trip() {
        let id = ObjectId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
