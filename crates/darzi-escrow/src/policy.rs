//! # Split Policy and Order Bounds
//!
//! The split policy divides an order total into deposit/fitting/final
//! shares by percentage. Allocation is exact: the remainder left by
//! integer percentage division folds into the fitting share, so
//! `deposit + fitting + final == total` always holds to the minor unit.

use serde::{Deserialize, Serialize};

use darzi_core::Money;

use crate::state::EscrowError;

/// Percentage split of an order total across the three payable stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPolicy {
    /// Deposit share in whole percent.
    pub deposit_pct: u8,
    /// Fitting share in whole percent.
    pub fitting_pct: u8,
    /// Final share in whole percent.
    pub final_pct: u8,
}

impl SplitPolicy {
    /// The platform default: 25% deposit, 50% fitting, 25% final.
    pub const STANDARD: SplitPolicy = SplitPolicy {
        deposit_pct: 25,
        fitting_pct: 50,
        final_pct: 25,
    };

    /// A policy with the given shares, validated to sum to 100.
    pub fn new(deposit_pct: u8, fitting_pct: u8, final_pct: u8) -> Result<Self, EscrowError> {
        let policy = Self {
            deposit_pct,
            fitting_pct,
            final_pct,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check that the shares are all non-zero and sum to exactly 100.
    pub fn validate(&self) -> Result<(), EscrowError> {
        let sum = self.deposit_pct as u16 + self.fitting_pct as u16 + self.final_pct as u16;
        if sum != 100 {
            return Err(EscrowError::InvalidSplit(format!(
                "shares must sum to 100, got {}/{}/{} = {sum}",
                self.deposit_pct, self.fitting_pct, self.final_pct
            )));
        }
        if self.deposit_pct == 0 || self.fitting_pct == 0 || self.final_pct == 0 {
            return Err(EscrowError::InvalidSplit(
                "every stage share must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Divide `total` into the three stage amounts, exactly.
    ///
    /// Deposit and final are floored percentages; fitting absorbs the
    /// remainder so the three always sum to `total`.
    pub fn allocate(&self, total: Money) -> Result<StageAllocation, EscrowError> {
        self.validate()?;
        if !total.is_positive() {
            return Err(EscrowError::InvalidAmount(format!(
                "order total must be positive, got {total}"
            )));
        }

        let deposit = total.percent(self.deposit_pct);
        let final_amount = total.percent(self.final_pct);
        let fitting = total
            .checked_sub(deposit)
            .and_then(|m| m.checked_sub(final_amount))
            .ok_or_else(|| EscrowError::InvalidAmount(format!("total {total} out of range")))?;

        Ok(StageAllocation {
            deposit,
            fitting,
            final_amount,
        })
    }
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// The exact amounts allocated to each payable stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAllocation {
    /// Deposit share.
    pub deposit: Money,
    /// Fitting share (absorbs the rounding remainder).
    pub fitting: Money,
    /// Final share.
    pub final_amount: Money,
}

impl StageAllocation {
    /// Sum of the three shares — always equal to the allocated total.
    pub fn total(&self) -> Money {
        self.deposit
            .checked_add(self.fitting)
            .and_then(|m| m.checked_add(self.final_amount))
            .unwrap_or(Money::ZERO)
    }
}

/// Accepted range for order totals at escrow initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBounds {
    /// Smallest order total the platform escrows.
    pub min_total: Money,
    /// Largest order total the platform escrows.
    pub max_total: Money,
}

impl OrderBounds {
    /// Reject totals outside the configured range.
    pub fn check(&self, total: Money) -> Result<(), EscrowError> {
        if total < self.min_total || total > self.max_total {
            return Err(EscrowError::InvalidAmount(format!(
                "order total {total} outside accepted range [{}, {}]",
                self.min_total, self.max_total
            )));
        }
        Ok(())
    }
}

impl Default for OrderBounds {
    fn default() -> Self {
        Self {
            min_total: Money::from_major(10),
            max_total: Money::from_major(1_000_000),
        }
    }
}

/// Ledger configuration: order bounds and the default split.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Accepted order-total range.
    pub bounds: OrderBounds,
    /// Split applied when the order class does not override it.
    pub default_split: SplitPolicy,
}
