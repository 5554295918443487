//! # Money — Fixed-Point Minor Units
//!
//! All amounts in the engine are a signed count of currency minor units
//! (2 fractional digits). Floats never participate in ledger arithmetic;
//! upstream conversions that did use floats are absorbed by the
//! [`Money::ROUNDING_TOLERANCE`] when comparing paid against allocated
//! amounts.
//!
//! ## Invariant
//!
//! Arithmetic that could overflow or go negative is explicit:
//! `checked_add` / `checked_sub` return `None` instead of wrapping, and
//! percentage computation widens to 128 bits internally.

use serde::{Deserialize, Serialize};

/// A monetary amount in currency minor units (e.g., 25000 = 250.00).
///
/// Serialized as a bare integer of minor units — never a float.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero amount.
    pub const ZERO: Money = Money(0);

    /// Permitted slack when comparing paid vs. allocated amounts:
    /// 1 minor unit (0.01 currency units).
    pub const ROUNDING_TOLERANCE: Money = Money(1);

    /// Construct from a count of minor units.
    pub const fn from_minor_units(minor: i64) -> Self {
        Self(minor)
    }

    /// Construct from whole currency units (e.g., `from_major(250)` = 250.00).
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    /// The raw count of minor units.
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// `pct` percent of this amount, rounded toward zero.
    ///
    /// Widens to 128 bits so `total * pct` cannot overflow.
    pub fn percent(self, pct: u8) -> Money {
        Money(((self.0 as i128 * pct as i128) / 100) as i64)
    }

    /// Whether the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Whether `self` exceeds `limit` by more than the rounding tolerance.
    pub fn exceeds_with_tolerance(&self, limit: Money) -> bool {
        self.0 > limit.0 + Money::ROUNDING_TOLERANCE.0
    }
}

impl std::fmt::Display for Money {
    /// Renders as a decimal with 2 fractional digits, e.g. `250.00` or `-0.05`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}
