//! # Escrow State Machine
//!
//! Pure state transitions for a single order's escrow. No I/O here: the
//! [`EscrowLedger`](crate::ledger::EscrowLedger) loads a state, applies
//! one of these transitions to a copy, and commits it with a
//! version-checked compare-and-swap. A transition either fully applies
//! (amounts plus a history entry) or returns an error leaving the copy
//! meaningless — partial application cannot reach the store.
//!
//! ## Invariants
//!
//! - `deposit_amount + fitting_amount + final_amount == total` exactly.
//! - `0 <= paid <= allocated + ROUNDING_TOLERANCE` per stage.
//! - `balance = total - released - refunded` never goes negative.
//! - `history` is append-only and written by this crate exclusively.
//! - The stage only advances DEPOSIT → FITTING → FINAL → RELEASED;
//!   REFUNDED is reachable only via [`LedgerResolution::FullRefund`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use darzi_core::{Money, OrderId, Timestamp};

use crate::policy::StageAllocation;
use crate::stage::EscrowStage;

/// Errors raised by escrow operations.
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Amount is non-positive, out of configured bounds, or overflows.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Split percentages are malformed.
    #[error("invalid split policy: {0}")]
    InvalidSplit(String),

    /// Payment arrived for a stage other than the active one.
    #[error("payment for stage {got} but ledger is at stage {expected}")]
    StageMismatch {
        /// The ledger's current stage.
        expected: EscrowStage,
        /// The stage the payment named.
        got: EscrowStage,
    },

    /// Payment would push the stage's paid total past its allocation.
    #[error("paying {attempted} into {stage} exceeds its allocation of {allocated}")]
    Overpayment {
        /// The stage being paid.
        stage: EscrowStage,
        /// The stage's allocated amount.
        allocated: Money,
        /// What the paid total would have become.
        attempted: Money,
    },

    /// Release requested for a stage ahead of the ledger's current one.
    #[error("cannot release {requested}: ledger is at stage {current}")]
    OutOfOrderRelease {
        /// The ledger's current stage.
        current: EscrowStage,
        /// The stage the release named.
        requested: EscrowStage,
    },

    /// Refund amount exceeds the remaining balance.
    #[error("refund of {requested} exceeds remaining balance {balance}")]
    InsufficientBalance {
        /// The balance at resolution time.
        balance: Money,
        /// The refund that was requested.
        requested: Money,
    },

    /// Payment carried no provider confirmation reference.
    #[error("payment is missing a provider confirmation reference")]
    ProviderConfirmationMissing,

    /// Escrow already exists for this order.
    #[error("escrow for {0} already initialized")]
    AlreadyInitialized(OrderId),

    /// No escrow state exists for this order.
    #[error("no escrow state for {0}")]
    NotFound(OrderId),

    /// Optimistic-locking conflict persisted across retries.
    #[error("concurrent modification of escrow state for {0}")]
    ConcurrentModification(OrderId),
}

/// What kind of mutation a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryKind {
    /// Provider-confirmed payment capture into a stage.
    Payment,
    /// Stage advance making the stage amount payable to the tailor.
    Release,
    /// Balance reduction from a dispute refund resolution.
    Refund,
    /// Audit note from a non-monetary dispute resolution.
    Note,
}

/// One append-only entry in an order's escrow history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// What happened.
    pub kind: HistoryKind,
    /// The stage the mutation applied to.
    pub stage: EscrowStage,
    /// Amount moved (zero for notes).
    pub amount: Money,
    /// External reference: provider capture id, approval id, or dispute id.
    pub reference: String,
    /// Free-form annotation.
    pub notes: Option<String>,
    /// When the mutation committed.
    pub timestamp: Timestamp,
}

/// A dispute resolution's effect on the ledger.
///
/// Defined here rather than in the dispute crate so the ledger never
/// depends upward; the dispute layer maps its resolution types into
/// this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerResolution {
    /// Refund the full remaining obligation; escrow terminates REFUNDED.
    FullRefund {
        /// Amount returned to the customer.
        amount: Money,
    },
    /// Refund part of the balance; the order continues at its stage.
    PartialRefund {
        /// Amount returned to the customer.
        amount: Money,
    },
    /// Order proceeds to completion; audit note only.
    Completion,
    /// No ledger effect; audit note only.
    NoAction,
}

/// Result of a release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The stage advanced; `amount` became payable.
    Released {
        /// The amount made payable to the tailor.
        amount: Money,
        /// The stage the ledger advanced to.
        new_stage: EscrowStage,
    },
    /// The stage was already advanced past — duplicate call, no-op.
    AlreadyReleased,
}

/// The escrow ledger state for a single order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowState {
    /// The order this escrow belongs to.
    pub order_id: OrderId,
    /// Current stage of the progression.
    pub stage: EscrowStage,
    /// Allocated deposit share.
    pub deposit_amount: Money,
    /// Allocated fitting share.
    pub fitting_amount: Money,
    /// Allocated final share.
    pub final_amount: Money,
    /// Captured payments against the deposit share.
    pub deposit_paid: Money,
    /// Captured payments against the fitting share.
    pub fitting_paid: Money,
    /// Captured payments against the final share.
    pub final_paid: Money,
    /// Cumulative amount released to the tailor.
    pub released: Money,
    /// Cumulative amount refunded to the customer.
    pub refunded: Money,
    /// Append-only mutation log.
    pub history: Vec<HistoryEntry>,
    /// When the escrow was initialized.
    pub created_at: Timestamp,
    /// When the state last changed.
    pub updated_at: Timestamp,
    /// Optimistic-locking version, bumped on every committed mutation.
    pub version: u64,
}

impl EscrowState {
    /// Fresh escrow at DEPOSIT with nothing paid.
    pub fn new(order_id: OrderId, allocation: StageAllocation, now: Timestamp) -> Self {
        Self {
            order_id,
            stage: EscrowStage::Deposit,
            deposit_amount: allocation.deposit,
            fitting_amount: allocation.fitting,
            final_amount: allocation.final_amount,
            deposit_paid: Money::ZERO,
            fitting_paid: Money::ZERO,
            final_paid: Money::ZERO,
            released: Money::ZERO,
            refunded: Money::ZERO,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// The order total: sum of the three allocated shares.
    pub fn total(&self) -> Money {
        self.deposit_amount
            .checked_add(self.fitting_amount)
            .and_then(|m| m.checked_add(self.final_amount))
            .unwrap_or(Money::ZERO)
    }

    /// What the platform still holds: total minus released minus refunded.
    pub fn balance(&self) -> Money {
        self.total()
            .checked_sub(self.released)
            .and_then(|m| m.checked_sub(self.refunded))
            .unwrap_or(Money::ZERO)
    }

    /// Allocated amount for a payable stage.
    pub fn allocated_for(&self, stage: EscrowStage) -> Option<Money> {
        match stage {
            EscrowStage::Deposit => Some(self.deposit_amount),
            EscrowStage::Fitting => Some(self.fitting_amount),
            EscrowStage::Final => Some(self.final_amount),
            EscrowStage::Released | EscrowStage::Refunded => None,
        }
    }

    /// Paid-so-far amount for a payable stage.
    pub fn paid_for(&self, stage: EscrowStage) -> Option<Money> {
        match stage {
            EscrowStage::Deposit => Some(self.deposit_paid),
            EscrowStage::Fitting => Some(self.fitting_paid),
            EscrowStage::Final => Some(self.final_paid),
            EscrowStage::Released | EscrowStage::Refunded => None,
        }
    }

    /// Record a provider-confirmed payment capture into the active stage.
    pub fn record_payment(
        &mut self,
        stage: EscrowStage,
        amount: Money,
        provider_reference: &str,
        now: Timestamp,
    ) -> Result<(), EscrowError> {
        if provider_reference.trim().is_empty() {
            return Err(EscrowError::ProviderConfirmationMissing);
        }
        if !amount.is_positive() {
            return Err(EscrowError::InvalidAmount(format!(
                "payment amount must be positive, got {amount}"
            )));
        }
        if stage != self.stage || !stage.is_payable() {
            return Err(EscrowError::StageMismatch {
                expected: self.stage,
                got: stage,
            });
        }

        let (allocated, paid) = match stage {
            EscrowStage::Deposit => (self.deposit_amount, self.deposit_paid),
            EscrowStage::Fitting => (self.fitting_amount, self.fitting_paid),
            EscrowStage::Final => (self.final_amount, self.final_paid),
            // Unreachable: is_payable() guarded above.
            EscrowStage::Released | EscrowStage::Refunded => {
                return Err(EscrowError::StageMismatch {
                    expected: self.stage,
                    got: stage,
                })
            }
        };
        let attempted = paid
            .checked_add(amount)
            .ok_or_else(|| EscrowError::InvalidAmount("paid total overflow".to_string()))?;
        if attempted.exceeds_with_tolerance(allocated) {
            return Err(EscrowError::Overpayment {
                stage,
                allocated,
                attempted,
            });
        }

        match stage {
            EscrowStage::Deposit => self.deposit_paid = attempted,
            EscrowStage::Fitting => self.fitting_paid = attempted,
            EscrowStage::Final => self.final_paid = attempted,
            EscrowStage::Released | EscrowStage::Refunded => {}
        }
        self.history.push(HistoryEntry {
            kind: HistoryKind::Payment,
            stage,
            amount,
            reference: provider_reference.to_string(),
            notes: None,
            timestamp: now,
        });
        Ok(())
    }

    /// Advance the stage, making its amount payable to the tailor.
    ///
    /// Releasing a stage the ledger already advanced past is a no-op —
    /// this is what makes release exactly-once under retries, with
    /// `(order_id, stage)` as the idempotency key.
    pub fn release_stage(
        &mut self,
        stage: EscrowStage,
        reference: &str,
        now: Timestamp,
    ) -> Result<ReleaseOutcome, EscrowError> {
        if !stage.is_payable() {
            return Err(EscrowError::OutOfOrderRelease {
                current: self.stage,
                requested: stage,
            });
        }
        if self.stage == EscrowStage::Refunded {
            return Err(EscrowError::OutOfOrderRelease {
                current: self.stage,
                requested: stage,
            });
        }
        if stage.order_index() < self.stage.order_index() {
            return Ok(ReleaseOutcome::AlreadyReleased);
        }
        if stage != self.stage {
            return Err(EscrowError::OutOfOrderRelease {
                current: self.stage,
                requested: stage,
            });
        }

        let (amount, new_stage) = match (self.allocated_for(stage), stage.next()) {
            (Some(amount), Some(next)) => (amount, next),
            // Unreachable: is_payable() guarded above.
            _ => {
                return Err(EscrowError::OutOfOrderRelease {
                    current: self.stage,
                    requested: stage,
                })
            }
        };
        self.released = self
            .released
            .checked_add(amount)
            .ok_or_else(|| EscrowError::InvalidAmount("released total overflow".to_string()))?;
        self.stage = new_stage;
        self.history.push(HistoryEntry {
            kind: HistoryKind::Release,
            stage,
            amount,
            reference: reference.to_string(),
            notes: None,
            timestamp: now,
        });
        Ok(ReleaseOutcome::Released { amount, new_stage })
    }

    /// Apply a dispute resolution's ledger effect.
    ///
    /// The only mutation path that bypasses the normal stage sequence.
    /// Idempotent per `reference`: a resolution whose effect is already
    /// in the history is a no-op, so a retry after a partial failure
    /// cannot refund twice.
    pub fn apply_resolution(
        &mut self,
        resolution: LedgerResolution,
        reference: &str,
        now: Timestamp,
    ) -> Result<(), EscrowError> {
        let already_applied = self.history.iter().any(|entry| {
            entry.reference == reference
                && matches!(entry.kind, HistoryKind::Refund | HistoryKind::Note)
        });
        if already_applied {
            return Ok(());
        }
        match resolution {
            LedgerResolution::FullRefund { amount } | LedgerResolution::PartialRefund { amount } => {
                if !amount.is_positive() {
                    return Err(EscrowError::InvalidAmount(format!(
                        "refund amount must be positive, got {amount}"
                    )));
                }
                let balance = self.balance();
                if amount > balance {
                    return Err(EscrowError::InsufficientBalance {
                        balance,
                        requested: amount,
                    });
                }
                self.refunded = self
                    .refunded
                    .checked_add(amount)
                    .ok_or_else(|| EscrowError::InvalidAmount("refund total overflow".to_string()))?;
                self.history.push(HistoryEntry {
                    kind: HistoryKind::Refund,
                    stage: self.stage,
                    amount,
                    reference: reference.to_string(),
                    notes: None,
                    timestamp: now,
                });
                if matches!(resolution, LedgerResolution::FullRefund { .. }) {
                    self.stage = EscrowStage::Refunded;
                }
                Ok(())
            }
            LedgerResolution::Completion | LedgerResolution::NoAction => {
                let label = match resolution {
                    LedgerResolution::Completion => "resolution: order completion",
                    _ => "resolution: no action",
                };
                self.history.push(HistoryEntry {
                    kind: HistoryKind::Note,
                    stage: self.stage,
                    amount: Money::ZERO,
                    reference: reference.to_string(),
                    notes: Some(label.to_string()),
                    timestamp: now,
                });
                Ok(())
            }
        }
    }
}
