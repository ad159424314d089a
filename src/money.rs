//! Precise decimal arithmetic for monetary values (prices, P&L, commission).
//!
//! Wraps `rust_decimal::Decimal` so `realized = total_sale - total_cost_of_sale
//! - total_commission` holds exactly rather than accumulating `f64` drift
//! across thousands of fills.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Build from an external `f64` (bar data, JSON config, RNG-perturbed
    /// simulated fill prices). Not used for internal aggregation.
    pub fn from_f64(value: f64) -> Self {
        Money(Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO))
    }

    pub fn from_u64(value: u64) -> Self {
        Money(Decimal::from(value))
    }

    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    /// Multiply by a dimensionless share count.
    pub fn times(self, quantity: u64) -> Self {
        Money(self.0 * Decimal::from(quantity))
    }

    /// Divide by a dimensionless share count. Zero quantity yields zero
    /// rather than a panic — callers already guard `quantity == 0`
    /// upstream, this is a defensive fallback.
    pub fn div_by(self, quantity: u64) -> Self {
        if quantity == 0 {
            Money::ZERO
        } else {
            Money(self.0 / Decimal::from(quantity))
        }
    }

    /// Scale by a ratio expressed as `f64` (spread offsets, percent
    /// thresholds). The ratio itself is not a monetary value, so round-tripping
    /// it through `f64` doesn't introduce the drift this type guards against.
    pub fn scale(self, ratio: f64) -> Self {
        Money::from_f64(self.to_f64() * ratio)
    }

    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Money(self.0 * rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl From<f64> for Money {
    fn from(value: f64) -> Self {
        Money::from_f64(value)
    }
}
