//! # Evidence Submission
//!
//! The tracker accepts tailor evidence for a production step and turns
//! it into a PENDING milestone. Submission is where the sequence is
//! enforced: a step opens only after its predecessor's latest attempt
//! counts as approved, and a step with a live attempt cannot be
//! submitted again. Rejection is the one path back — it permits a
//! fresh attempt with a fresh response window.

use std::sync::Arc;

use tracing::info;

use darzi_core::{ActorId, DomainEvent, EventSink, MilestoneId, OrderId, Timestamp};

use crate::milestone::{
    ApprovalStatus, EvidenceRef, Milestone, MilestoneError, AUTO_APPROVAL_WINDOW_HOURS,
};
use crate::production::ProductionStage;
use crate::store::MilestoneStore;

/// Accepts evidence submissions and answers review queries.
pub struct MilestoneTracker {
    store: Arc<dyn MilestoneStore>,
    events: Arc<dyn EventSink>,
}

impl MilestoneTracker {
    /// Build a tracker over the given store and event sink.
    pub fn new(store: Arc<dyn MilestoneStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    /// Submit evidence for a production step, opening a PENDING milestone.
    ///
    /// The 48-hour auto-approval clock starts at submission time.
    pub fn submit_evidence(
        &self,
        order_id: OrderId,
        stage: ProductionStage,
        evidence: EvidenceRef,
        notes: Option<String>,
        submitted_by: ActorId,
    ) -> Result<Milestone, MilestoneError> {
        self.submit_evidence_at(order_id, stage, evidence, notes, submitted_by, Timestamp::now())
    }

    /// [`Self::submit_evidence`] with an explicit clock.
    pub fn submit_evidence_at(
        &self,
        order_id: OrderId,
        stage: ProductionStage,
        evidence: EvidenceRef,
        notes: Option<String>,
        submitted_by: ActorId,
        now: Timestamp,
    ) -> Result<Milestone, MilestoneError> {
        evidence.validate()?;

        let existing = self.store.for_order(order_id)?;

        // A live (pending or approved) attempt blocks resubmission;
        // only a rejected latest attempt opens the next one.
        let attempt = match latest_for_stage(&existing, stage) {
            Some(prior) if prior.status == ApprovalStatus::Rejected => prior.attempt + 1,
            Some(prior) => {
                return Err(MilestoneError::AlreadySubmitted {
                    stage,
                    status: prior.status,
                })
            }
            None => 1,
        };

        if let Some(predecessor) = stage.predecessor() {
            let unblocked = latest_for_stage(&existing, predecessor)
                .is_some_and(|m| m.status.counts_as_approved());
            if !unblocked {
                return Err(MilestoneError::OutOfSequence { stage, predecessor });
            }
        }

        let milestone = Milestone {
            id: MilestoneId::new(),
            order_id,
            stage,
            attempt,
            evidence,
            notes,
            submitted_by,
            verified_at: now,
            auto_approval_deadline: now.plus_hours(AUTO_APPROVAL_WINDOW_HOURS),
            status: ApprovalStatus::Pending,
            customer_reviewed_at: None,
            rejection_reason: None,
            dispute_id: None,
            version: 0,
        };
        self.store.insert(milestone.clone())?;

        info!(
            %order_id,
            milestone_id = %milestone.id,
            %stage,
            attempt,
            deadline = %milestone.auto_approval_deadline,
            "milestone evidence submitted"
        );
        self.events.emit(DomainEvent::MilestoneSubmitted {
            order_id,
            milestone_id: milestone.id,
            stage: stage.as_str().to_string(),
            submitted_by,
            auto_approval_deadline: milestone.auto_approval_deadline,
        });
        Ok(milestone)
    }

    /// The milestone currently awaiting this order's customer, if any.
    ///
    /// At most one attempt per order is PENDING at a time, by
    /// construction: the sequence only advances past approved steps.
    pub fn pending_review(&self, order_id: OrderId) -> Result<Option<Milestone>, MilestoneError> {
        let milestones = self.store.for_order(order_id)?;
        Ok(milestones
            .into_iter()
            .find(|m| m.status == ApprovalStatus::Pending))
    }

    /// All attempts for an order, in production order then attempt order.
    pub fn milestones_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<Milestone>, MilestoneError> {
        self.store.for_order(order_id)
    }
}

/// The highest-attempt milestone for a step, if any was submitted.
fn latest_for_stage(milestones: &[Milestone], stage: ProductionStage) -> Option<&Milestone> {
    milestones
        .iter()
        .filter(|m| m.stage == stage)
        .max_by_key(|m| m.attempt)
}
