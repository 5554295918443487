//! # Dispute Storage Seam
//!
//! Same optimistic-locking contract as the escrow store: writes go
//! through a version-checked compare-and-swap so two admins acting on
//! the same case cannot silently overwrite each other.

use std::collections::HashMap;
use std::sync::RwLock;

use darzi_core::DisputeId;

use crate::dispute::Dispute;
use crate::service::DisputeError;

/// Storage contract for dispute cases.
pub trait DisputeStore: Send + Sync {
    /// Load a case by id.
    fn load(&self, id: DisputeId) -> Result<Option<Dispute>, DisputeError>;

    /// Insert a fresh case.
    fn insert(&self, dispute: Dispute) -> Result<(), DisputeError>;

    /// Replace the stored case iff its version still equals
    /// `expected_version`. Returns `false` on a lost race.
    fn compare_and_swap(
        &self,
        expected_version: u64,
        dispute: Dispute,
    ) -> Result<bool, DisputeError>;

    /// All cases still counting against their SLA clock.
    fn list_active(&self) -> Result<Vec<Dispute>, DisputeError>;
}

/// In-memory store backed by a `RwLock`ed map.
#[derive(Debug, Default)]
pub struct MemoryDisputeStore {
    disputes: RwLock<HashMap<DisputeId, Dispute>>,
}

impl MemoryDisputeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisputeStore for MemoryDisputeStore {
    fn load(&self, id: DisputeId) -> Result<Option<Dispute>, DisputeError> {
        let disputes = self.disputes.read().unwrap_or_else(|e| e.into_inner());
        Ok(disputes.get(&id).cloned())
    }

    fn insert(&self, dispute: Dispute) -> Result<(), DisputeError> {
        let mut disputes = self.disputes.write().unwrap_or_else(|e| e.into_inner());
        disputes.insert(dispute.id, dispute);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        expected_version: u64,
        dispute: Dispute,
    ) -> Result<bool, DisputeError> {
        let mut disputes = self.disputes.write().unwrap_or_else(|e| e.into_inner());
        match disputes.get(&dispute.id) {
            Some(current) if current.version == expected_version => {
                disputes.insert(dispute.id, dispute);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(DisputeError::NotFound(dispute.id)),
        }
    }

    fn list_active(&self) -> Result<Vec<Dispute>, DisputeError> {
        let disputes = self.disputes.read().unwrap_or_else(|e| e.into_inner());
        let mut active: Vec<Dispute> = disputes
            .values()
            .filter(|d| d.status.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|d| d.sla_deadline);
        Ok(active)
    }
}
