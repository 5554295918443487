//! # Dispute Service
//!
//! Drives the dispute lifecycle and is the single caller of
//! [`EscrowLedger::apply_resolution`]. The compare-and-set that commits
//! RESOLVED is the linearization point: of any set of concurrent
//! resolves exactly one wins, and only the winner's ledger effect is
//! applied. A refund that the ledger cannot honor after the commit
//! leaves the case RESOLVED with the payment pending;
//! [`DisputeService::reapply_resolution`] replays it (the ledger skips
//! an effect it has already recorded for the case).

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use darzi_core::{
    ActorId, DisputeId, DomainEvent, EventSink, MilestoneId, Money, OrderId, Timestamp,
};
use darzi_escrow::{EscrowError, EscrowLedger, LedgerResolution};

use crate::dispute::{
    Dispute, DisputeCategory, DisputePriority, DisputeResolution, DisputeStatus, ResolutionType,
};
use crate::store::DisputeStore;

/// Attempts before a CAS conflict is reported to the caller.
const CAS_RETRIES: u32 = 3;

/// Errors raised by dispute operations.
#[derive(Error, Debug)]
pub enum DisputeError {
    /// No case with this id.
    #[error("no dispute case {0}")]
    NotFound(DisputeId),

    /// A refund resolution type arrived without an amount.
    #[error("resolution type {0} requires a refund amount")]
    RefundAmountRequired(ResolutionType),

    /// The refund amount is non-positive.
    #[error("refund amount must be positive, got {0}")]
    InvalidRefundAmount(Money),

    /// A non-refund resolution type arrived with an amount.
    #[error("resolution type {0} does not take a refund amount")]
    UnexpectedRefundAmount(ResolutionType),

    /// The requested status change is not in the lifecycle.
    #[error("invalid dispute transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: DisputeStatus,
        /// Attempted target status.
        to: DisputeStatus,
    },

    /// Optimistic-locking conflict persisted across retries.
    #[error("concurrent modification of dispute {0}")]
    ConcurrentModification(DisputeId),

    /// The ledger rejected the resolution's effect.
    #[error(transparent)]
    Escrow(#[from] EscrowError),
}

/// Parameters for opening a dispute case.
#[derive(Debug, Clone)]
pub struct OpenDispute {
    /// The order in dispute.
    pub order_id: OrderId,
    /// The rejected milestone, when applicable.
    pub milestone_id: Option<MilestoneId>,
    /// What the case is about.
    pub category: DisputeCategory,
    /// Short case title.
    pub title: String,
    /// Full description.
    pub description: String,
    /// Who is filing.
    pub opened_by: ActorId,
    /// Explicit priority; `None` takes the category default.
    pub priority: Option<DisputePriority>,
}

/// The dispute escalation service.
pub struct DisputeService {
    store: Arc<dyn DisputeStore>,
    ledger: Arc<EscrowLedger>,
    events: Arc<dyn EventSink>,
}

impl DisputeService {
    /// Service over the given store, ledger, and event sink.
    pub fn new(
        store: Arc<dyn DisputeStore>,
        ledger: Arc<EscrowLedger>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            ledger,
            events,
        }
    }

    /// File a new case. The SLA deadline is `now + priority hours`.
    pub fn open(&self, params: OpenDispute) -> Result<Dispute, DisputeError> {
        let now = Timestamp::now();
        let priority = params
            .priority
            .unwrap_or_else(|| params.category.default_priority());
        let dispute = Dispute {
            id: DisputeId::new(),
            order_id: params.order_id,
            milestone_id: params.milestone_id,
            category: params.category,
            title: params.title,
            description: params.description,
            status: DisputeStatus::Open,
            priority,
            sla_deadline: now.plus_hours(priority.sla_hours()),
            opened_by: params.opened_by,
            assigned_to: None,
            resolution: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        self.store.insert(dispute.clone())?;
        info!(
            dispute_id = %dispute.id,
            order_id = %dispute.order_id,
            category = %dispute.category,
            priority = %dispute.priority,
            sla_deadline = %dispute.sla_deadline,
            "dispute opened"
        );
        self.events.emit(DomainEvent::DisputeOpened {
            order_id: dispute.order_id,
            dispute_id: dispute.id,
            category: dispute.category.as_str().to_string(),
            priority: dispute.priority.as_str().to_string(),
            sla_deadline: dispute.sla_deadline,
        });
        Ok(dispute)
    }

    /// File the case a milestone rejection automatically opens.
    pub fn open_for_rejection(
        &self,
        order_id: OrderId,
        milestone_id: MilestoneId,
        reason: &str,
        opened_by: ActorId,
    ) -> Result<Dispute, DisputeError> {
        self.open(OpenDispute {
            order_id,
            milestone_id: Some(milestone_id),
            category: DisputeCategory::MilestoneRejection,
            title: "Milestone rejected".to_string(),
            description: reason.to_string(),
            opened_by,
            priority: None,
        })
    }

    /// Load a case by id.
    pub fn get(&self, id: DisputeId) -> Result<Dispute, DisputeError> {
        self.store.load(id)?.ok_or(DisputeError::NotFound(id))
    }

    /// Put an admin on the case: OPEN → IN_PROGRESS.
    pub fn assign(&self, id: DisputeId, admin: ActorId) -> Result<Dispute, DisputeError> {
        let dispute = self.transition(id, DisputeStatus::InProgress, |d| {
            d.assigned_to = Some(admin);
        })?;
        info!(dispute_id = %id, admin = %admin, "dispute assigned");
        Ok(dispute)
    }

    /// Settle a case with a recorded outcome.
    ///
    /// Refund types require a positive `refund_amount` within the
    /// ledger's balance; the completion/no-action types take no amount
    /// and make no ledger mutation beyond an audit note. The RESOLVED
    /// transition commits before the ledger is touched, so a concurrent
    /// resolve of the same case loses at the swap and never reaches the
    /// ledger.
    pub fn resolve(
        &self,
        id: DisputeId,
        resolution_type: ResolutionType,
        outcome: &str,
        refund_amount: Option<Money>,
        resolved_by: ActorId,
    ) -> Result<Dispute, DisputeError> {
        let current = self.get(id)?;
        if !current.status.can_transition_to(DisputeStatus::Resolved) {
            return Err(DisputeError::InvalidTransition {
                from: current.status,
                to: DisputeStatus::Resolved,
            });
        }

        let ledger_effect = match (resolution_type, refund_amount) {
            (ResolutionType::FullRefund | ResolutionType::PartialRefund, None) => {
                return Err(DisputeError::RefundAmountRequired(resolution_type));
            }
            (ResolutionType::FullRefund, Some(amount)) => {
                check_positive(amount)?;
                LedgerResolution::FullRefund { amount }
            }
            (ResolutionType::PartialRefund, Some(amount)) => {
                check_positive(amount)?;
                LedgerResolution::PartialRefund { amount }
            }
            (ResolutionType::OrderCompletion | ResolutionType::NoAction, Some(_)) => {
                return Err(DisputeError::UnexpectedRefundAmount(resolution_type));
            }
            (ResolutionType::OrderCompletion, None) => LedgerResolution::Completion,
            (ResolutionType::NoAction, None) => LedgerResolution::NoAction,
        };

        // Balance guard before committing, so an over-balance refund
        // fails while the case is still open. Advisory only: the swap
        // below is what linearizes.
        if let LedgerResolution::FullRefund { amount } | LedgerResolution::PartialRefund { amount } =
            ledger_effect
        {
            let balance = self.ledger.get(current.order_id)?.balance();
            if amount > balance {
                return Err(DisputeError::Escrow(EscrowError::InsufficientBalance {
                    balance,
                    requested: amount,
                }));
            }
        }

        let resolution = DisputeResolution {
            resolution_type,
            outcome: outcome.to_string(),
            refund_amount,
            resolved_by,
            resolved_at: Timestamp::now(),
            payment_processed: false,
        };
        // The lifecycle check runs again inside the swap loop; a racing
        // resolver loses here, before any money moves.
        let dispute = self.transition(id, DisputeStatus::Resolved, |d| {
            d.resolution = Some(resolution.clone());
        })?;

        self.ledger
            .apply_resolution(dispute.order_id, ledger_effect, &id.to_string())?;
        info!(
            dispute_id = %id,
            resolution_type = %resolution_type,
            refund = ?refund_amount,
            "dispute resolved"
        );
        self.events.emit(DomainEvent::DisputeResolved {
            order_id: dispute.order_id,
            dispute_id: id,
            resolution_type: resolution_type.as_str().to_string(),
            refund_amount,
            resolved_by,
        });
        Ok(dispute)
    }

    /// Replay the ledger effect of a committed resolution.
    ///
    /// The retry path for a resolve whose ledger call failed after the
    /// RESOLVED transition. Safe to repeat: the ledger is idempotent
    /// per case reference, so an effect already applied is a no-op.
    pub fn reapply_resolution(&self, id: DisputeId) -> Result<Dispute, DisputeError> {
        let dispute = self.get(id)?;
        let resolution = match &dispute.resolution {
            Some(resolution) => resolution,
            None => {
                return Err(DisputeError::InvalidTransition {
                    from: dispute.status,
                    to: DisputeStatus::Resolved,
                })
            }
        };
        let ledger_effect = match (resolution.resolution_type, resolution.refund_amount) {
            (ResolutionType::FullRefund, Some(amount)) => LedgerResolution::FullRefund { amount },
            (ResolutionType::PartialRefund, Some(amount)) => {
                LedgerResolution::PartialRefund { amount }
            }
            (ResolutionType::FullRefund | ResolutionType::PartialRefund, None) => {
                // Unreachable: resolve() requires the amount for refunds.
                return Err(DisputeError::RefundAmountRequired(resolution.resolution_type));
            }
            (ResolutionType::OrderCompletion, _) => LedgerResolution::Completion,
            (ResolutionType::NoAction, _) => LedgerResolution::NoAction,
        };
        self.ledger
            .apply_resolution(dispute.order_id, ledger_effect, &id.to_string())?;
        info!(dispute_id = %id, "resolution ledger effect replayed");
        Ok(dispute)
    }

    /// Raise the case beyond first-line handling.
    pub fn escalate(&self, id: DisputeId, actor: ActorId) -> Result<Dispute, DisputeError> {
        let dispute = self.transition(id, DisputeStatus::Escalated, |_| {})?;
        warn!(dispute_id = %id, actor = %actor, "dispute escalated");
        Ok(dispute)
    }

    /// Archive a resolved or escalated case.
    pub fn close(&self, id: DisputeId) -> Result<Dispute, DisputeError> {
        let dispute = self.transition(id, DisputeStatus::Closed, |_| {})?;
        info!(dispute_id = %id, "dispute closed");
        Ok(dispute)
    }

    /// Mark the refund as transferred by the payment layer.
    pub fn mark_refund_processed(&self, id: DisputeId) -> Result<Dispute, DisputeError> {
        self.update(id, |d| {
            match &mut d.resolution {
                Some(resolution) if resolution.refund_amount.is_some() => {
                    resolution.payment_processed = true;
                    Ok(())
                }
                _ => Err(DisputeError::InvalidTransition {
                    from: d.status,
                    to: d.status,
                }),
            }
        })
    }

    /// Advisory SLA sweep: emit a warning for every overdue active case.
    ///
    /// Never mutates dispute state; safe to run repeatedly.
    pub fn sla_sweep(&self, now: Timestamp) -> Result<Vec<Dispute>, DisputeError> {
        let overdue: Vec<Dispute> = self
            .store
            .list_active()?
            .into_iter()
            .filter(|d| d.is_overdue(now))
            .collect();
        for dispute in &overdue {
            warn!(
                dispute_id = %dispute.id,
                priority = %dispute.priority,
                sla_deadline = %dispute.sla_deadline,
                "dispute past SLA deadline"
            );
            self.events.emit(DomainEvent::SlaWarning {
                order_id: dispute.order_id,
                dispute_id: dispute.id,
                priority: dispute.priority.as_str().to_string(),
                sla_deadline: dispute.sla_deadline,
                overdue_minutes: now.minutes_since(dispute.sla_deadline),
            });
        }
        Ok(overdue)
    }

    /// Status transition via CAS, validating against the lifecycle.
    fn transition(
        &self,
        id: DisputeId,
        to: DisputeStatus,
        apply: impl Fn(&mut Dispute),
    ) -> Result<Dispute, DisputeError> {
        self.update(id, |d| {
            if !d.status.can_transition_to(to) {
                return Err(DisputeError::InvalidTransition {
                    from: d.status,
                    to,
                });
            }
            d.status = to;
            apply(d);
            Ok(())
        })
    }

    /// Load → mutate a copy → CAS, with bounded retry.
    fn update(
        &self,
        id: DisputeId,
        op: impl Fn(&mut Dispute) -> Result<(), DisputeError>,
    ) -> Result<Dispute, DisputeError> {
        for attempt in 0..CAS_RETRIES {
            let current = self.get(id)?;
            let expected = current.version;
            let mut next = current;
            op(&mut next)?;
            next.version = expected + 1;
            next.updated_at = Timestamp::now();
            if self.store.compare_and_swap(expected, next.clone())? {
                return Ok(next);
            }
            warn!(dispute_id = %id, attempt, "dispute update lost optimistic-lock race, retrying");
        }
        Err(DisputeError::ConcurrentModification(id))
    }
}

fn check_positive(amount: Money) -> Result<(), DisputeError> {
    if !amount.is_positive() {
        return Err(DisputeError::InvalidRefundAmount(amount));
    }
    Ok(())
}
