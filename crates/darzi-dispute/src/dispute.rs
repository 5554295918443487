//! # Dispute Records and Taxonomy
//!
//! ## States
//!
//! OPEN → IN_PROGRESS → RESOLVED | ESCALATED → CLOSED
//!
//! Resolution may also happen straight from OPEN. CLOSED is the only
//! state with no outgoing transitions; RESOLVED and ESCALATED accept
//! only `close`.
//!
//! ## SLA
//!
//! The deadline is assigned at creation from the priority:
//! CRITICAL=4h, HIGH=24h, MEDIUM=48h, LOW=72h. Categories carry a
//! suggested default priority that an admin may override.

use serde::{Deserialize, Serialize};

use darzi_core::{ActorId, DisputeId, MilestoneId, Money, OrderId, Timestamp};

/// The lifecycle state of a dispute case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    /// Filed, awaiting admin attention.
    Open,
    /// An admin has taken the case.
    InProgress,
    /// Resolved with a recorded outcome.
    Resolved,
    /// Raised beyond first-line handling.
    Escalated,
    /// Archived (terminal).
    Closed,
}

impl DisputeStatus {
    /// The canonical string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Resolved => "RESOLVED",
            Self::Escalated => "ESCALATED",
            Self::Closed => "CLOSED",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether the case still counts against its SLA clock.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }

    /// Whether `to` is a legal next status.
    ///
    /// No wildcard — a new variant must make its transitions explicit.
    pub fn can_transition_to(&self, to: DisputeStatus) -> bool {
        matches!(
            (self, to),
            (Self::Open, Self::InProgress)
                | (Self::Open, Self::Resolved)
                | (Self::Open, Self::Escalated)
                | (Self::InProgress, Self::Resolved)
                | (Self::InProgress, Self::Escalated)
                | (Self::Resolved, Self::Closed)
                | (Self::Escalated, Self::Closed)
        )
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a dispute is about. Each category suggests a default priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeCategory {
    /// Customer rejected a production milestone.
    MilestoneRejection,
    /// Payment capture or release went wrong.
    PaymentProblem,
    /// Workmanship complaint outside the milestone flow.
    QualityIssue,
    /// The order is running late.
    DeliveryDelay,
    /// Parties cannot reach each other.
    Communication,
    /// Anything else.
    Other,
}

impl DisputeCategory {
    /// The canonical string name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MilestoneRejection => "MILESTONE_REJECTION",
            Self::PaymentProblem => "PAYMENT_PROBLEM",
            Self::QualityIssue => "QUALITY_ISSUE",
            Self::DeliveryDelay => "DELIVERY_DELAY",
            Self::Communication => "COMMUNICATION",
            Self::Other => "OTHER",
        }
    }

    /// Suggested priority when the admin does not override.
    pub fn default_priority(&self) -> DisputePriority {
        match self {
            Self::MilestoneRejection | Self::PaymentProblem => DisputePriority::High,
            Self::QualityIssue | Self::DeliveryDelay | Self::Other => DisputePriority::Medium,
            Self::Communication => DisputePriority::Low,
        }
    }
}

impl std::fmt::Display for DisputeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of a dispute; determines the SLA window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputePriority {
    /// 72-hour SLA.
    Low,
    /// 48-hour SLA.
    Medium,
    /// 24-hour SLA.
    High,
    /// 4-hour SLA.
    Critical,
}

impl DisputePriority {
    /// The canonical string name of this priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Hours until the SLA deadline, from case creation.
    pub fn sla_hours(&self) -> i64 {
        match self {
            Self::Low => 72,
            Self::Medium => 48,
            Self::High => 24,
            Self::Critical => 4,
        }
    }
}

impl std::fmt::Display for DisputePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a dispute was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionType {
    /// Refund the customer's full remaining obligation.
    FullRefund,
    /// Refund part of the balance; the order continues.
    PartialRefund,
    /// Order proceeds to completion as produced.
    OrderCompletion,
    /// Case dismissed without effect.
    NoAction,
}

impl ResolutionType {
    /// The canonical string name of this resolution type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullRefund => "FULL_REFUND",
            Self::PartialRefund => "PARTIAL_REFUND",
            Self::OrderCompletion => "ORDER_COMPLETION",
            Self::NoAction => "NO_ACTION",
        }
    }

    /// Whether this resolution moves money back to the customer.
    pub fn is_refund(&self) -> bool {
        matches!(self, Self::FullRefund | Self::PartialRefund)
    }
}

impl std::fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recorded outcome of a resolved dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolution {
    /// How the case was settled.
    pub resolution_type: ResolutionType,
    /// Free-form outcome summary for the parties.
    pub outcome: String,
    /// Refund amount; present iff the type is a refund.
    pub refund_amount: Option<Money>,
    /// The admin who resolved the case.
    pub resolved_by: ActorId,
    /// When the case was resolved.
    pub resolved_at: Timestamp,
    /// Whether the payment layer has moved the refund. Recorded false at
    /// resolution; flipped by the payment layer once the transfer clears.
    pub payment_processed: bool,
}

/// A dispute case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    /// Unique case identifier.
    pub id: DisputeId,
    /// The order in dispute.
    pub order_id: OrderId,
    /// The rejected milestone, when the case came from a rejection.
    pub milestone_id: Option<MilestoneId>,
    /// What the case is about.
    pub category: DisputeCategory,
    /// Short case title.
    pub title: String,
    /// Full description / rejection reason.
    pub description: String,
    /// Lifecycle state.
    pub status: DisputeStatus,
    /// Urgency; fixes the SLA window.
    pub priority: DisputePriority,
    /// When the case should be resolved by.
    pub sla_deadline: Timestamp,
    /// Who filed the case.
    pub opened_by: ActorId,
    /// The admin handling the case.
    pub assigned_to: Option<ActorId>,
    /// Present iff status is RESOLVED or the case closed after resolution.
    pub resolution: Option<DisputeResolution>,
    /// When the case was filed.
    pub created_at: Timestamp,
    /// When the case last changed.
    pub updated_at: Timestamp,
    /// Optimistic-locking version.
    pub version: u64,
}

impl Dispute {
    /// Whether the case is active and past its SLA deadline.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.status.is_active() && now > self.sla_deadline
    }
}
