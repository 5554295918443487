//! # Milestone Records
//!
//! A [`Milestone`] is one attempt at a production step: tailor-submitted
//! photographic evidence awaiting a customer decision. It is mutated
//! exactly once, PENDING → terminal; after that only the dispute
//! reference may be attached (on rejection).
//!
//! Every terminal decision also appends a [`MilestoneApproval`] audit
//! record, which is never mutated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use darzi_core::{ActorId, ApprovalId, DisputeId, MilestoneId, OrderId, Timestamp};
use darzi_dispute::DisputeError;
use darzi_escrow::EscrowError;

use crate::production::ProductionStage;

/// Customer response window before a pending milestone is force-approved.
pub const AUTO_APPROVAL_WINDOW_HOURS: i64 = 48;

/// Declared MIME types accepted for milestone evidence.
pub const SUPPORTED_EVIDENCE_MIME: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Errors raised by milestone operations.
#[derive(Error, Debug)]
pub enum MilestoneError {
    /// Step submitted before its predecessor was approved.
    #[error("cannot submit {stage}: predecessor {predecessor} is not approved")]
    OutOfSequence {
        /// The step that was submitted.
        stage: ProductionStage,
        /// The predecessor that must be approved first.
        predecessor: ProductionStage,
    },

    /// The step already has a pending or approved attempt.
    #[error("stage {stage} already has an attempt in status {status}")]
    AlreadySubmitted {
        /// The step that was submitted.
        stage: ProductionStage,
        /// Status of the existing attempt.
        status: ApprovalStatus,
    },

    /// A decision was attempted on a milestone no longer PENDING.
    #[error("milestone {milestone_id} already decided: {status}")]
    AlreadyDecided {
        /// The milestone in question.
        milestone_id: MilestoneId,
        /// Its terminal status.
        status: ApprovalStatus,
    },

    /// Rejection requires a non-empty reason.
    #[error("rejection requires a non-empty reason")]
    RejectionReasonRequired,

    /// Evidence URL is empty.
    #[error("milestone evidence requires a photo URL")]
    MissingEvidence,

    /// Evidence declared an unsupported MIME type.
    #[error("unsupported evidence MIME type: {0}")]
    UnsupportedMime(String),

    /// No milestone with this id.
    #[error("no milestone {0}")]
    NotFound(MilestoneId),

    /// Optimistic-locking conflict persisted across retries.
    #[error("concurrent modification of milestone {0}")]
    ConcurrentModification(MilestoneId),

    /// The ledger rejected a gated release.
    #[error(transparent)]
    Escrow(#[from] EscrowError),

    /// Opening the rejection dispute failed.
    #[error(transparent)]
    Dispute(#[from] DisputeError),
}

/// Approval state of a milestone attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    /// Awaiting the customer's decision.
    Pending,
    /// Customer approved (terminal).
    Approved,
    /// Customer rejected (terminal).
    Rejected,
    /// Response window elapsed; system approved (terminal).
    AutoApproved,
}

impl ApprovalStatus {
    /// The canonical string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::AutoApproved => "AUTO_APPROVED",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether this status unblocks the next step in the sequence.
    pub fn counts_as_approved(&self) -> bool {
        matches!(self, Self::Approved | Self::AutoApproved)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The action recorded on a [`MilestoneApproval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalAction {
    /// Manual customer approval.
    Approved,
    /// Manual customer rejection.
    Rejected,
    /// System approval after the response window.
    AutoApproved,
}

impl ApprovalAction {
    /// The canonical string name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::AutoApproved => "AUTO_APPROVED",
        }
    }
}

/// Reference to tailor-submitted photo evidence.
///
/// The engine stores only the URL handed back by the storage layer and
/// the declared MIME type; image content is not inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Where the photo lives.
    pub url: String,
    /// Declared content type.
    pub mime_type: String,
}

impl EvidenceRef {
    /// Validate the reference: non-empty URL, supported MIME type.
    pub fn validate(&self) -> Result<(), MilestoneError> {
        if self.url.trim().is_empty() {
            return Err(MilestoneError::MissingEvidence);
        }
        if !SUPPORTED_EVIDENCE_MIME.contains(&self.mime_type.as_str()) {
            return Err(MilestoneError::UnsupportedMime(self.mime_type.clone()));
        }
        Ok(())
    }
}

/// One attempt at a production step, awaiting or past customer review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Unique attempt identifier.
    pub id: MilestoneId,
    /// The order being produced.
    pub order_id: OrderId,
    /// Which production step this is.
    pub stage: ProductionStage,
    /// 1-based attempt counter; >1 only after a rejected attempt.
    pub attempt: u32,
    /// Photo evidence for the step.
    pub evidence: EvidenceRef,
    /// Tailor's submission notes.
    pub notes: Option<String>,
    /// The tailor who submitted the evidence.
    pub submitted_by: ActorId,
    /// When the evidence was submitted (review clock starts here).
    pub verified_at: Timestamp,
    /// `verified_at + 48h`: when the system may force-approve.
    pub auto_approval_deadline: Timestamp,
    /// Approval state.
    pub status: ApprovalStatus,
    /// When the customer decided, if they did.
    pub customer_reviewed_at: Option<Timestamp>,
    /// Present iff status is REJECTED.
    pub rejection_reason: Option<String>,
    /// The dispute opened for this milestone's rejection.
    pub dispute_id: Option<DisputeId>,
    /// Optimistic-locking version.
    pub version: u64,
}

impl Milestone {
    /// Whether the auto-approval window has elapsed.
    pub fn is_past_deadline(&self, now: Timestamp) -> bool {
        now >= self.auto_approval_deadline
    }
}

/// Append-only audit record of a terminal milestone decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneApproval {
    /// Unique record identifier.
    pub id: ApprovalId,
    /// The decided milestone.
    pub milestone_id: MilestoneId,
    /// The order it belongs to.
    pub order_id: OrderId,
    /// Who decided — [`ActorId::system()`] for auto-approvals.
    pub actor_id: ActorId,
    /// What was decided.
    pub action: ApprovalAction,
    /// Approval comment or rejection reason.
    pub comment: Option<String>,
    /// When the decision committed.
    pub decided_at: Timestamp,
}
