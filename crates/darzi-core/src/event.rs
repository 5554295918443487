//! # Domain Events — Notification Seam
//!
//! The engine announces state changes through [`DomainEvent`] values
//! pushed into an [`EventSink`]. An external dispatcher fans these out
//! to SMS/WhatsApp/push/email; that transport is not modeled here.
//!
//! ## Invariant
//!
//! Emission is fire-and-forget. A sink must not panic, and nothing the
//! sink does can roll back the ledger or milestone state that has
//! already committed — events are emitted *after* the owning store has
//! accepted the mutation.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::identity::{ActorId, ApprovalId, DisputeId, MilestoneId, OrderId};
use crate::money::Money;
use crate::temporal::Timestamp;

/// A state change announced to external notification delivery.
///
/// Stage, category, and priority names are canonical SCREAMING_SNAKE
/// strings rather than the enums of the owning crates, so the event
/// surface stays free of cross-crate type dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    /// A tailor submitted milestone evidence for customer review.
    MilestoneSubmitted {
        order_id: OrderId,
        milestone_id: MilestoneId,
        stage: String,
        submitted_by: ActorId,
        auto_approval_deadline: Timestamp,
    },
    /// A milestone reached APPROVED or AUTO_APPROVED.
    MilestoneApproved {
        order_id: OrderId,
        milestone_id: MilestoneId,
        stage: String,
        decided_by: ActorId,
        auto: bool,
    },
    /// A milestone was rejected; a dispute has been opened for it.
    MilestoneRejected {
        order_id: OrderId,
        milestone_id: MilestoneId,
        stage: String,
        decided_by: ActorId,
        reason: String,
        dispute_id: DisputeId,
    },
    /// An escrow stage advanced and its amount became payable.
    StageReleased {
        order_id: OrderId,
        stage: String,
        amount: Money,
        approval_id: ApprovalId,
    },
    /// A dispute case was opened.
    DisputeOpened {
        order_id: OrderId,
        dispute_id: DisputeId,
        category: String,
        priority: String,
        sla_deadline: Timestamp,
    },
    /// A dispute case was resolved.
    DisputeResolved {
        order_id: OrderId,
        dispute_id: DisputeId,
        resolution_type: String,
        refund_amount: Option<Money>,
        resolved_by: ActorId,
    },
    /// A dispute is past its SLA deadline and still unresolved.
    SlaWarning {
        order_id: OrderId,
        dispute_id: DisputeId,
        priority: String,
        sla_deadline: Timestamp,
        overdue_minutes: i64,
    },
}

impl DomainEvent {
    /// The order this event belongs to.
    pub fn order_id(&self) -> OrderId {
        match self {
            Self::MilestoneSubmitted { order_id, .. }
            | Self::MilestoneApproved { order_id, .. }
            | Self::MilestoneRejected { order_id, .. }
            | Self::StageReleased { order_id, .. }
            | Self::DisputeOpened { order_id, .. }
            | Self::DisputeResolved { order_id, .. }
            | Self::SlaWarning { order_id, .. } => *order_id,
        }
    }
}

/// Receiver of domain events.
///
/// Implementations must be non-panicking and cheap; anything slow
/// (network delivery) belongs behind a queue in the implementor.
pub trait EventSink: Send + Sync {
    /// Accept an event. Must not fail observably — the engine does not
    /// inspect the result of delivery.
    fn emit(&self, event: DomainEvent);
}

/// Sink that logs every event through `tracing` at INFO level.
///
/// The default when the embedding service has not wired a dispatcher.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: DomainEvent) {
        tracing::info!(order_id = %event.order_id(), event = ?event, "domain event");
    }
}

/// Sink that records events in memory for test assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Drain and return everything emitted so far.
    pub fn take(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: DomainEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
