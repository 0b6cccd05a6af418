use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::format::FormatError;

/// A 64-bit identifier for a persistent entity (model, element, subcategory).
///
/// Persisted as a lowercase hexadecimal string such as `"0x20000000004"`.
/// The value 0 is reserved as "invalid".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Id64(u64);

pub type ModelId = Id64;
pub type ElementId = Id64;

impl Id64 {
    pub const INVALID: Id64 = Id64(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Id64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl FromStr for Id64 {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| FormatError::InvalidId(s.to_string()))?;
        u64::from_str_radix(hex, 16)
            .map(Id64)
            .map_err(|_| FormatError::InvalidId(s.to_string()))
    }
}

impl TryFrom<String> for Id64 {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Id64> for String {
    fn from(id: Id64) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id: Id64 = "0x20000000004".parse().unwrap();
        assert_eq!(id.value(), 0x20000000004);
        assert_eq!(id.to_string(), "0x20000000004");
        assert!(id.is_valid());
        assert!(!Id64::INVALID.is_valid());
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        assert!("1234".parse::<Id64>().is_err());
        assert!("0xZZ".parse::<Id64>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id: Id64 = serde_json::from_str("\"0x1c\"").unwrap();
        assert_eq!(id, Id64::new(0x1c));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"0x1c\"");
        assert!(serde_json::from_str::<Id64>("\"bogus\"").is_err());
    }
}
