//! Money type with fixed decimal precision, and ISO 4217 currency codes.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! `Money` wraps `rust_decimal::Decimal` and always carries exactly
//! [`Money::SCALE`] fractional digits, with at most
//! [`Money::INTEGER_DIGITS`] digits before the point (`NUMERIC(20, 2)`).

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing or constructing money values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Amount is not a valid decimal, has too many fractional digits, or is
    /// out of range.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Currency code is not three ASCII letters.
    #[error("Invalid currency code: {0}")]
    InvalidCurrencyCode(String),
}

/// A monetary quantity with exactly two fractional digits.
///
/// Money itself imposes no sign restriction; non-negativity of balances is
/// a ledger rule, not a property of the type. Magnitudes are bounded so
/// every value fits the persisted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Number of fractional digits carried by every value.
    pub const SCALE: u32 = 2;

    /// Maximum number of digits before the decimal point.
    pub const INTEGER_DIGITS: u32 = 18;

    /// Returns a zero amount.
    #[must_use]
    pub fn zero() -> Self {
        Self(Decimal::new(0, Self::SCALE))
    }

    /// Creates an amount from minor units (e.g. `150` is `1.50`).
    #[must_use]
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, Self::SCALE))
    }

    /// Returns the inner decimal.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly below zero.
    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns true if the amount is strictly above zero.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Adds two amounts, returning `None` if the sum is out of range.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).and_then(Self::rescaled)
    }

    /// Subtracts `other`, returning `None` if the difference is out of range.
    /// Crossing zero is allowed.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).and_then(Self::rescaled)
    }

    /// Exclusive bound on the magnitude: `10^INTEGER_DIGITS`.
    fn bound() -> Decimal {
        Decimal::from(10_i64.pow(Self::INTEGER_DIGITS))
    }

    /// Rescales to exactly [`Self::SCALE`] digits, or `None` when the value
    /// is too large to carry them.
    fn rescaled(mut value: Decimal) -> Option<Self> {
        if value.abs() >= Self::bound() {
            return None;
        }
        value.rescale(Self::SCALE);
        (value.scale() == Self::SCALE).then_some(Self(value))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.normalize().scale() > Self::SCALE {
            return Err(MoneyError::InvalidAmount(format!(
                "{value} has more than {} fractional digits",
                Self::SCALE
            )));
        }
        Self::rescaled(value).ok_or_else(|| {
            MoneyError::InvalidAmount(format!(
                "{value} exceeds {} integer digits",
                Self::INTEGER_DIGITS
            ))
        })
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| MoneyError::InvalidAmount(format!("'{s}' is not a decimal number")))?;
        Self::try_from(value)
    }
}

impl Add for Money {
    type Output = Self;

    /// # Panics
    ///
    /// Panics if the sum is out of range; use [`Money::checked_add`] on
    /// untrusted input.
    fn add(self, rhs: Self) -> Self::Output {
        match self.checked_add(rhs) {
            Some(sum) => sum,
            None => panic!("money overflow: {self} + {rhs}"),
        }
    }
}

impl Sub for Money {
    type Output = Self;

    /// # Panics
    ///
    /// Panics if the difference is out of range; use [`Money::checked_sub`]
    /// on untrusted input.
    fn sub(self, rhs: Self) -> Self::Output {
        match self.checked_sub(rhs) {
            Some(difference) => difference,
            None => panic!("money overflow: {self} - {rhs}"),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code: exactly three uppercase ASCII letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only ASCII letters are ever stored.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.as_bytes() {
            [a, b, c] if trimmed.bytes().all(|byte| byte.is_ascii_alphabetic()) => Ok(Self([
                a.to_ascii_uppercase(),
                b.to_ascii_uppercase(),
                c.to_ascii_uppercase(),
            ])),
            _ => Err(MoneyError::InvalidCurrencyCode(s.to_string())),
        }
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
