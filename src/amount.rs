//! Exact decimal amounts of money.
//!
//! Every amount in the engine flows through [`MoneyAmount`]: a bounded,
//! non-negative [`Decimal`] that parses from human input (`"$0.25"`,
//! `"1,000"`), from JSON strings or numbers, and from raw token base units.
//! Amounts serialize as strings so downstream consumers never round-trip
//! through floating point.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

mod bounds {
    use once_cell::sync::Lazy;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    /// Upper bound for any single amount the engine will touch.
    pub const MAX_STR: &str = "999999999999";
    pub static MAX: Lazy<Decimal> = Lazy::new(|| Decimal::from_str(MAX_STR).unwrap());
}

/// A non-negative decimal amount within engine bounds.
///
/// Construction goes through [`MoneyAmount::new`] or one of the parsing
/// entry points, so a held value is always in `[0, 999999999999]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MoneyAmount(Decimal);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyAmountError {
    /// Input could not be read as a decimal number.
    #[error("Invalid number format")]
    InvalidFormat,
    /// Value exceeds the engine-wide maximum.
    #[error("Amount must not exceed {}", bounds::MAX_STR)]
    OutOfRange,
    /// Negative amounts are never valid.
    #[error("Negative value is not allowed")]
    Negative,
}

impl MoneyAmount {
    pub const ZERO: MoneyAmount = MoneyAmount(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, MoneyAmountError> {
        if value.is_sign_negative() {
            return Err(MoneyAmountError::Negative);
        }
        if value > *bounds::MAX {
            return Err(MoneyAmountError::OutOfRange);
        }
        Ok(Self(value))
    }

    /// Parses human or machine input, tolerating currency symbols and
    /// thousands separators: `"$1,000.50"` parses as `1000.50`.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountError> {
        static CURRENCY_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d.\-]+").unwrap());
        let cleaned = CURRENCY_NOISE.replace_all(input.trim(), "");
        if cleaned.is_empty() {
            return Err(MoneyAmountError::InvalidFormat);
        }
        let value =
            Decimal::from_str(cleaned.as_ref()).map_err(|_| MoneyAmountError::InvalidFormat)?;
        Self::new(value)
    }

    /// Interprets a raw token base-unit count, e.g. `"100000"` at 6 decimals
    /// is `0.1`.
    pub fn from_base_units(raw: &str, decimals: u32) -> Result<Self, MoneyAmountError> {
        let units = raw
            .trim()
            .parse::<u128>()
            .map_err(|_| MoneyAmountError::InvalidFormat)?;
        let mut value = Decimal::from_u128(units).ok_or(MoneyAmountError::OutOfRange)?;
        value
            .set_scale(decimals)
            .map_err(|_| MoneyAmountError::InvalidFormat)?;
        Self::new(value.normalize())
    }

    /// Amount from integer minor units, e.g. `(150, 2)` is `1.50`.
    /// Scale must be at most 28.
    pub(crate) fn from_minor_units(units: u32, scale: u32) -> Self {
        MoneyAmount(Decimal::new(i64::from(units), scale))
    }

    pub fn checked_add(&self, other: MoneyAmount) -> Option<MoneyAmount> {
        let sum = self.0.checked_add(other.0)?;
        MoneyAmount::new(sum).ok()
    }

    /// Addition clamped to the engine maximum. Used for usage tallies where
    /// saturation is preferable to losing the comparison entirely.
    pub fn saturating_add(&self, other: MoneyAmount) -> MoneyAmount {
        let sum = self.0.saturating_add(other.0);
        if sum > *bounds::MAX {
            MoneyAmount(*bounds::MAX)
        } else {
            MoneyAmount(sum)
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl From<u64> for MoneyAmount {
    fn from(value: u64) -> Self {
        MoneyAmount(Decimal::from(value))
    }
}

impl TryFrom<f64> for MoneyAmount {
    type Error = MoneyAmountError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let decimal = Decimal::from_f64(value).ok_or(MoneyAmountError::InvalidFormat)?;
        MoneyAmount::new(decimal)
    }
}

impl From<MoneyAmount> for Decimal {
    fn from(value: MoneyAmount) -> Self {
        value.0
    }
}

impl Serialize for MoneyAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

struct MoneyAmountVisitor;

impl Visitor<'_> for MoneyAmountVisitor {
    type Value = MoneyAmount;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a decimal amount as a string or number")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        MoneyAmount::parse(v).map_err(de::Error::custom)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        MoneyAmount::new(Decimal::from(v)).map_err(de::Error::custom)
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        MoneyAmount::new(Decimal::from(v)).map_err(de::Error::custom)
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        MoneyAmount::try_from(v).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for MoneyAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(MoneyAmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_decimal() {
        let amount = MoneyAmount::parse("10.50").unwrap();
        assert_eq!(amount.to_string(), "10.5");
    }

    #[test]
    fn test_parse_currency_noise() {
        assert_eq!(MoneyAmount::parse("$0.25").unwrap().to_string(), "0.25");
        assert_eq!(MoneyAmount::parse("1,000").unwrap().to_string(), "1000");
        assert_eq!(MoneyAmount::parse(" $1,000.50 ").unwrap().to_string(), "1000.5");
    }

    #[test]
    fn test_parse_zero() {
        let amount = MoneyAmount::parse("0").unwrap();
        assert!(amount.is_zero());
        assert_eq!(amount, MoneyAmount::ZERO);
    }

    #[test]
    fn test_parse_rejects_negative() {
        assert_eq!(
            MoneyAmount::parse("-5"),
            Err(MoneyAmountError::Negative)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(MoneyAmount::parse("abc"), Err(MoneyAmountError::InvalidFormat));
        assert_eq!(MoneyAmount::parse(""), Err(MoneyAmountError::InvalidFormat));
        assert_eq!(MoneyAmount::parse("1.2.3"), Err(MoneyAmountError::InvalidFormat));
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert_eq!(
            MoneyAmount::parse("1000000000000"),
            Err(MoneyAmountError::OutOfRange)
        );
    }

    #[test]
    fn test_base_units() {
        let amount = MoneyAmount::from_base_units("100000", 6).unwrap();
        assert_eq!(amount, MoneyAmount::parse("0.1").unwrap());
        let amount = MoneyAmount::from_base_units("1", 6).unwrap();
        assert_eq!(amount.to_string(), "0.000001");
    }

    #[test]
    fn test_base_units_rejects_non_integer() {
        assert!(MoneyAmount::from_base_units("0.5", 6).is_err());
        assert!(MoneyAmount::from_base_units("nope", 6).is_err());
    }

    #[test]
    fn test_saturating_add_clamps() {
        let max = MoneyAmount::parse(super::bounds::MAX_STR).unwrap();
        let one = MoneyAmount::from(1u64);
        assert_eq!(max.saturating_add(one), max);
        assert_eq!(one.checked_add(max), None);
    }

    #[test]
    fn test_serde_string_and_number() {
        let from_string: MoneyAmount = serde_json::from_str("\"0.5\"").unwrap();
        let from_float: MoneyAmount = serde_json::from_str("0.5").unwrap();
        let from_int: MoneyAmount = serde_json::from_str("3").unwrap();
        assert_eq!(from_string, from_float);
        assert_eq!(from_int, MoneyAmount::from(3u64));
        assert_eq!(serde_json::to_string(&from_string).unwrap(), "\"0.5\"");
    }

    #[test]
    fn test_serde_rejects_negative_number() {
        assert!(serde_json::from_str::<MoneyAmount>("-4").is_err());
        assert!(serde_json::from_str::<MoneyAmount>("\"-4\"").is_err());
    }

    #[test]
    fn test_from_minor_units() {
        assert_eq!(MoneyAmount::from_minor_units(150, 2).to_string(), "1.5");
    }
}
