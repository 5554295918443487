//! # Escrow Storage Seam
//!
//! The ledger talks to storage through [`EscrowStore`], which exposes a
//! version-checked compare-and-swap instead of blind writes. A SQL
//! backing implements the swap as `UPDATE ... WHERE order_id = $1 AND
//! version = $2` and reports zero affected rows as a lost race; the
//! in-memory backing here does the same check under a lock.
//!
//! Row ownership is per-order: operations on different orders never
//! contend.

use std::collections::HashMap;
use std::sync::RwLock;

use darzi_core::OrderId;

use crate::state::{EscrowError, EscrowState};

/// Storage contract for escrow states.
pub trait EscrowStore: Send + Sync {
    /// Load the state for an order, if initialized.
    fn load(&self, order_id: OrderId) -> Result<Option<EscrowState>, EscrowError>;

    /// Insert a fresh state; fails if the order already has one.
    fn insert(&self, state: EscrowState) -> Result<(), EscrowError>;

    /// Replace the stored state iff its version still equals
    /// `expected_version`. Returns `false` on a lost race.
    fn compare_and_swap(
        &self,
        expected_version: u64,
        state: EscrowState,
    ) -> Result<bool, EscrowError>;
}

/// In-memory store backed by a `RwLock`ed map.
#[derive(Debug, Default)]
pub struct MemoryEscrowStore {
    states: RwLock<HashMap<OrderId, EscrowState>>,
}

impl MemoryEscrowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EscrowStore for MemoryEscrowStore {
    fn load(&self, order_id: OrderId) -> Result<Option<EscrowState>, EscrowError> {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        Ok(states.get(&order_id).cloned())
    }

    fn insert(&self, state: EscrowState) -> Result<(), EscrowError> {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        if states.contains_key(&state.order_id) {
            return Err(EscrowError::AlreadyInitialized(state.order_id));
        }
        states.insert(state.order_id, state);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        expected_version: u64,
        state: EscrowState,
    ) -> Result<bool, EscrowError> {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        match states.get(&state.order_id) {
            Some(current) if current.version == expected_version => {
                states.insert(state.order_id, state);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(EscrowError::NotFound(state.order_id)),
        }
    }
}
