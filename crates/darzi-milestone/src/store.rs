//! # Milestone Storage Seam
//!
//! Milestone records are written through a version-checked
//! compare-and-swap — the swap on `status` is what linearizes
//! concurrent approve/reject/auto-approve attempts into exactly one
//! terminal decision. Approval audit records are append-only.

use std::collections::HashMap;
use std::sync::RwLock;

use darzi_core::{MilestoneId, OrderId, Timestamp};

use crate::milestone::{ApprovalStatus, Milestone, MilestoneApproval, MilestoneError};

/// Storage contract for milestones and their approval audit trail.
pub trait MilestoneStore: Send + Sync {
    /// Load a milestone by id.
    fn load(&self, id: MilestoneId) -> Result<Option<Milestone>, MilestoneError>;

    /// Insert a fresh milestone attempt.
    fn insert(&self, milestone: Milestone) -> Result<(), MilestoneError>;

    /// Replace the stored milestone iff its version still equals
    /// `expected_version`. Returns `false` on a lost race.
    fn compare_and_swap(
        &self,
        expected_version: u64,
        milestone: Milestone,
    ) -> Result<bool, MilestoneError>;

    /// All attempts for an order, in production order then attempt order.
    fn for_order(&self, order_id: OrderId) -> Result<Vec<Milestone>, MilestoneError>;

    /// All PENDING milestones whose auto-approval deadline has passed.
    fn pending_past_deadline(&self, now: Timestamp) -> Result<Vec<Milestone>, MilestoneError>;

    /// Append an approval audit record.
    fn record_approval(&self, approval: MilestoneApproval) -> Result<(), MilestoneError>;

    /// Audit records for an order, oldest first.
    fn approvals_for_order(&self, order_id: OrderId)
        -> Result<Vec<MilestoneApproval>, MilestoneError>;
}

/// In-memory store backed by `RwLock`ed collections.
#[derive(Debug, Default)]
pub struct MemoryMilestoneStore {
    milestones: RwLock<HashMap<MilestoneId, Milestone>>,
    approvals: RwLock<Vec<MilestoneApproval>>,
}

impl MemoryMilestoneStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MilestoneStore for MemoryMilestoneStore {
    fn load(&self, id: MilestoneId) -> Result<Option<Milestone>, MilestoneError> {
        let milestones = self.milestones.read().unwrap_or_else(|e| e.into_inner());
        Ok(milestones.get(&id).cloned())
    }

    fn insert(&self, milestone: Milestone) -> Result<(), MilestoneError> {
        let mut milestones = self.milestones.write().unwrap_or_else(|e| e.into_inner());
        milestones.insert(milestone.id, milestone);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        expected_version: u64,
        milestone: Milestone,
    ) -> Result<bool, MilestoneError> {
        let mut milestones = self.milestones.write().unwrap_or_else(|e| e.into_inner());
        match milestones.get(&milestone.id) {
            Some(current) if current.version == expected_version => {
                milestones.insert(milestone.id, milestone);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(MilestoneError::NotFound(milestone.id)),
        }
    }

    fn for_order(&self, order_id: OrderId) -> Result<Vec<Milestone>, MilestoneError> {
        let milestones = self.milestones.read().unwrap_or_else(|e| e.into_inner());
        let mut result: Vec<Milestone> = milestones
            .values()
            .filter(|m| m.order_id == order_id)
            .cloned()
            .collect();
        result.sort_by_key(|m| (m.stage.index(), m.attempt));
        Ok(result)
    }

    fn pending_past_deadline(&self, now: Timestamp) -> Result<Vec<Milestone>, MilestoneError> {
        let milestones = self.milestones.read().unwrap_or_else(|e| e.into_inner());
        let mut due: Vec<Milestone> = milestones
            .values()
            .filter(|m| m.status == ApprovalStatus::Pending && m.is_past_deadline(now))
            .cloned()
            .collect();
        due.sort_by_key(|m| m.auto_approval_deadline);
        Ok(due)
    }

    fn record_approval(&self, approval: MilestoneApproval) -> Result<(), MilestoneError> {
        let mut approvals = self.approvals.write().unwrap_or_else(|e| e.into_inner());
        approvals.push(approval);
        Ok(())
    }

    fn approvals_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<MilestoneApproval>, MilestoneError> {
        let approvals = self.approvals.read().unwrap_or_else(|e| e.into_inner());
        Ok(approvals
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect())
    }
}
