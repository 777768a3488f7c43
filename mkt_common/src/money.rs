use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "EUR";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Cannot combine amounts in different currencies ({0} and {1})")]
    CurrencyMismatch(Currency, Currency),
    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("The amount is too large to represent: {0}")]
    Overflow(String),
}

//--------------------------------------       Cents         ---------------------------------------------------------
/// A fixed-point amount in hundredths of the currency unit.
///
/// The operator impls are plain `i64` arithmetic and are meant for amounts that are already bounded, such as sums of
/// validated prices. Anything derived from untrusted input goes through the `checked_*` methods instead.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Cents(i64);

op!(binary Cents, Add, add);
op!(binary Cents, Sub, sub);
op!(inplace Cents, AddAssign, add_assign);
op!(inplace Cents, SubAssign, sub_assign);
op!(unary Cents, Neg, neg);

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Parses decimal strings such as `"110.70"`, `"5"` or `"-0.5"`. At most two decimal places are accepted.
impl FromStr for Cents {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MoneyError::InvalidAmount(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (units, fraction) = match digits.split_once('.') {
            Some((u, f)) => (u, f),
            None => (digits, ""),
        };
        if units.is_empty() || fraction.len() > 2 || !units.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let units = units.parse::<i64>().map_err(|_| invalid())?;
        let fraction = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse::<i64>().map_err(|_| invalid())?,
        };
        let cents = units.checked_mul(100).and_then(|v| v.checked_add(fraction)).ok_or_else(invalid)?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl Cents {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Multiplies by a rate given in basis points (1/100th of a percent), rounding half away from zero.
    pub fn apply_rate_bps(self, bps: i64) -> Self {
        let product = i128::from(self.0) * i128::from(bps);
        let half = if product >= 0 { 5_000 } else { -5_000 };
        let rounded = (product + half) / 10_000;
        Self(i64::try_from(rounded).unwrap_or(if rounded > 0 { i64::MAX } else { i64::MIN }))
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, MoneyError> {
        self.0.checked_add(rhs.0).map(Self).ok_or_else(|| MoneyError::Overflow(format!("{self} + {rhs}")))
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, MoneyError> {
        self.0.checked_sub(rhs.0).map(Self).ok_or_else(|| MoneyError::Overflow(format!("{self} - {rhs}")))
    }

    pub fn checked_mul(self, rhs: i64) -> Result<Self, MoneyError> {
        self.0.checked_mul(rhs).map(Self).ok_or_else(|| MoneyError::Overflow(format!("{self} x {rhs}")))
    }

    /// The absolute distance between two amounts.
    pub fn abs_diff(self, other: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_sub(other.0)
            .and_then(i64::checked_abs)
            .map(Self)
            .ok_or_else(|| MoneyError::Overflow(format!("|{self} - {other}|")))
    }
}

//--------------------------------------      Currency       ---------------------------------------------------------
/// An ISO-4217 style, three-letter, upper-case currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(MoneyError::InvalidCurrency(code))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self(DEFAULT_CURRENCY_CODE.to_string())
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

//--------------------------------------        Money        ---------------------------------------------------------
/// An amount tagged with its currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount: Cents,
    pub currency: Currency,
}

impl Money {
    pub fn new<A: Into<Cents>>(amount: A, currency: Currency) -> Self {
        Self { amount: amount.into(), currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self { amount: Cents::default(), currency }
    }

    pub fn cents(&self) -> i64 {
        self.amount.value()
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.same_currency(other)?;
        Ok(Money::new(self.amount.checked_add(other.amount)?, self.currency.clone()))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.same_currency(other)?;
        Ok(Money::new(self.amount.checked_sub(other.amount)?, self.currency.clone()))
    }

    pub fn with_amount(&self, amount: Cents) -> Money {
        Money::new(amount, self.currency.clone())
    }

    fn same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch(self.currency.clone(), other.currency.clone()))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
