//! DateKey: the 8-digit `DDMMYYYY` key used by caches and holiday sets.
//!
//! The textual form does not sort chronologically (`01032025` < `02012025`),
//! so ordering is defined on the underlying calendar date, never on the string.

use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Cache/holiday key format.
pub const KEY_FORMAT: &str = "%d%m%Y";

/// Output CSV date format.
pub const DISPLAY_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateKeyError {
    #[error("date key must be 8 digits (DDMMYYYY), got '{0}'")]
    Malformed(String),

    #[error("date key '{0}' is not a valid calendar date")]
    InvalidDate(String),
}

/// A trading date, serialized as `DDMMYYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Parse an 8-digit `DDMMYYYY` key.
    pub fn parse(s: &str) -> Result<Self, DateKeyError> {
        let s = s.trim();
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DateKeyError::Malformed(s.to_string()));
        }
        NaiveDate::parse_from_str(s, KEY_FORMAT)
            .map(Self)
            .map_err(|_| DateKeyError::InvalidDate(s.to_string()))
    }

    /// `DD-MM-YYYY`, as written to the consolidated CSV.
    pub fn display(&self) -> String {
        self.0.format(DISPLAY_FORMAT).to_string()
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(KEY_FORMAT))
    }
}

impl FromStr for DateKey {
    type Err = DateKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn key(s: &str) -> DateKey {
        DateKey::parse(s).unwrap()
    }

    #[test]
    fn formats_as_eight_digits() {
        let k = DateKey::new(NaiveDate::from_ymd_opt(2025, 2, 3).unwrap());
        assert_eq!(k.to_string(), "03022025");
        assert_eq!(k.display(), "03-02-2025");
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(
            DateKey::parse("3022025"),
            Err(DateKeyError::Malformed(_))
        ));
        assert!(matches!(
            DateKey::parse("2025-02-03"),
            Err(DateKeyError::Malformed(_))
        ));
        assert!(matches!(
            DateKey::parse("31022025"),
            Err(DateKeyError::InvalidDate(_))
        ));
    }

    #[test]
    fn orders_by_calendar_not_text() {
        // Lexically "01032025" < "02012025"; chronologically it is later.
        assert!(key("02012025") < key("01032025"));
        assert!(key("31122024") < key("01012025"));
    }

    #[test]
    fn json_map_keys_roundtrip_as_strings() {
        let mut map = BTreeMap::new();
        map.insert(key("03022025"), 1.5_f64);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"03022025":1.5}"#);

        let back: BTreeMap<DateKey, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn bad_json_key_is_an_error() {
        let result: Result<BTreeMap<DateKey, f64>, _> = serde_json::from_str(r#"{"2025":1.0}"#);
        assert!(result.is_err());
    }
}
