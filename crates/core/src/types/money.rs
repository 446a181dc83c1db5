//! Money amounts using decimal arithmetic.
//!
//! Prices travel as plain JSON numbers (`"totalPrice": 50`) both on the wire
//! and in device storage, so [`Money`] serializes through
//! `rust_decimal::serde::float` while arithmetic stays exact in memory.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An amount in the store's currency (Turkish lira).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Money {
    /// Zero lira.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create an amount from a decimal value.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create an amount from whole lira.
    #[must_use]
    pub fn from_whole(amount: i64) -> Self {
        Self(Decimal::from(amount))
    }

    /// The underlying decimal value.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Amount saved by paying `self` instead of `original`.
    ///
    /// Not clamped: a negative result means the input prices were inverted.
    #[must_use]
    pub fn savings_against(self, original: Self) -> Self {
        original - self
    }

    /// Format for display with the currency symbol (e.g., `₺49.90`).
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}{:.2}", CurrencyCode::TRY.symbol(), self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    TRY,
    EUR,
    USD,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::TRY => "₺",
            Self::EUR => "€",
            Self::USD => "$",
        }
    }
}
