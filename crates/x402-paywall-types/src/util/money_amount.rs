//! Human-readable price parsing.
//!
//! Prices in the catalog configuration are written the way people write them:
//! `"0.02"`, `"$0.05"`, `"1,000"`. [`MoneyAmount`] strips currency symbols and
//! separators and keeps the exact decimal value, so no binary floating point is
//! ever involved in pricing.
//!
//! ```rust
//! use x402_paywall_types::util::MoneyAmount;
//!
//! let amount = MoneyAmount::parse("$0.05").unwrap();
//! assert_eq!(amount.scale(), 2);
//! assert_eq!(amount.mantissa(), 5);
//! ```

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

/// A strictly positive decimal amount of money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MoneyAmount(Decimal);

impl MoneyAmount {
    /// Number of decimal places as written.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// The value without its decimal point: `"12.34"` gives `1234`.
    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountParseError {
    #[error("Invalid number format")]
    InvalidFormat,
    #[error(
        "Amount must be between {} and {}",
        constants::MIN_STR,
        constants::MAX_STR
    )]
    OutOfRange,
    #[error("Negative value is not allowed")]
    Negative,
}

mod constants {
    use super::*;

    pub const MIN_STR: &str = "0.000000001";
    pub const MAX_STR: &str = "999999999";

    pub static MIN: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MIN_STR).expect("valid decimal"));
    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d\.\-]+").expect("valid regex"));

impl MoneyAmount {
    /// Parses a human-readable amount.
    ///
    /// Currency symbols, thousand separators and whitespace are dropped before
    /// parsing. Zero falls below the allowed minimum, so a parsed amount is
    /// never free.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let cleaned = NON_NUMERIC.replace_all(input, "");
        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;
        Self::try_from(parsed)
    }
}

impl TryFrom<Decimal> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MoneyAmountParseError::Negative);
        }
        if value < *constants::MIN || value > *constants::MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }
        Ok(MoneyAmount(value))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Serialize for MoneyAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MoneyAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MoneyAmount::parse(&s).map_err(serde::de::Error::custom)
    }
}
