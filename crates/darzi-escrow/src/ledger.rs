//! # Escrow Ledger Service
//!
//! Orchestrates escrow mutations: load the state, apply a pure
//! transition from [`state`](crate::state) to a copy, commit with a
//! version-checked compare-and-swap, and emit the resulting event. A
//! lost swap re-reads and retries a bounded number of times; persistent
//! contention surfaces as [`EscrowError::ConcurrentModification`]
//! rather than blocking.
//!
//! Release is idempotent per `(order_id, stage)`: a duplicate call for
//! a stage already advanced past commits nothing and returns the
//! current state.

use std::sync::Arc;

use tracing::{debug, info, warn};

use darzi_core::{ApprovalId, DomainEvent, EventSink, Money, OrderId, Timestamp};

use crate::policy::{EscrowConfig, SplitPolicy};
use crate::stage::EscrowStage;
use crate::state::{EscrowError, EscrowState, LedgerResolution, ReleaseOutcome};
use crate::store::EscrowStore;

/// Attempts before a CAS conflict is reported to the caller.
const CAS_RETRIES: u32 = 3;

/// The escrow ledger: the single owner of [`EscrowState`] mutations.
pub struct EscrowLedger {
    store: Arc<dyn EscrowStore>,
    events: Arc<dyn EventSink>,
    config: EscrowConfig,
}

impl EscrowLedger {
    /// Ledger with the default bounds and split.
    pub fn new(store: Arc<dyn EscrowStore>, events: Arc<dyn EventSink>) -> Self {
        Self::with_config(store, events, EscrowConfig::default())
    }

    /// Ledger with explicit configuration.
    pub fn with_config(
        store: Arc<dyn EscrowStore>,
        events: Arc<dyn EventSink>,
        config: EscrowConfig,
    ) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    /// Create the escrow for a confirmed order.
    ///
    /// Splits `total` per the given policy (platform default when
    /// `None`), after checking the configured order-total bounds.
    pub fn initialize(
        &self,
        order_id: OrderId,
        total: Money,
        policy: Option<SplitPolicy>,
    ) -> Result<EscrowState, EscrowError> {
        self.config.bounds.check(total)?;
        let policy = policy.unwrap_or(self.config.default_split);
        let allocation = policy.allocate(total)?;
        let state = EscrowState::new(order_id, allocation, Timestamp::now());
        self.store.insert(state.clone())?;
        info!(
            %order_id,
            total = %total,
            deposit = %allocation.deposit,
            fitting = %allocation.fitting,
            final_amount = %allocation.final_amount,
            "escrow initialized"
        );
        Ok(state)
    }

    /// Current state for an order.
    pub fn get(&self, order_id: OrderId) -> Result<EscrowState, EscrowError> {
        self.store
            .load(order_id)?
            .ok_or(EscrowError::NotFound(order_id))
    }

    /// Record a payment capture confirmed by the external provider.
    ///
    /// Invoked from the provider's success callback only; the ledger
    /// never initiates capture.
    pub fn record_payment(
        &self,
        order_id: OrderId,
        stage: EscrowStage,
        amount: Money,
        provider_reference: &str,
    ) -> Result<EscrowState, EscrowError> {
        let (state, ()) = self.update(order_id, |s, now| {
            s.record_payment(stage, amount, provider_reference, now)
        })?;
        info!(%order_id, %stage, %amount, provider_reference, "payment recorded");
        Ok(state)
    }

    /// Release a stage's amount to the tailor and advance the stage.
    ///
    /// The only mutation path triggered by milestone approval. Duplicate
    /// calls for an already-advanced stage are no-ops.
    pub fn release_stage(
        &self,
        order_id: OrderId,
        stage: EscrowStage,
        approval_id: ApprovalId,
    ) -> Result<EscrowState, EscrowError> {
        let reference = approval_id.to_string();
        let (state, outcome) =
            self.update(order_id, |s, now| s.release_stage(stage, &reference, now))?;
        match outcome {
            ReleaseOutcome::Released { amount, new_stage } => {
                info!(%order_id, %stage, %amount, %new_stage, "stage released");
                self.events.emit(DomainEvent::StageReleased {
                    order_id,
                    stage: stage.as_str().to_string(),
                    amount,
                    approval_id,
                });
            }
            ReleaseOutcome::AlreadyReleased => {
                debug!(%order_id, %stage, "duplicate release ignored");
            }
        }
        Ok(state)
    }

    /// Apply a dispute resolution's ledger effect.
    ///
    /// The only mutation path triggered by dispute resolution. `reference`
    /// names the dispute for the history log.
    pub fn apply_resolution(
        &self,
        order_id: OrderId,
        resolution: LedgerResolution,
        reference: &str,
    ) -> Result<EscrowState, EscrowError> {
        let (state, ()) = self.update(order_id, |s, now| {
            s.apply_resolution(resolution, reference, now)
        })?;
        info!(%order_id, ?resolution, reference, balance = %state.balance(), "resolution applied");
        Ok(state)
    }

    /// Load → pure transition on a copy → CAS, with bounded retry.
    ///
    /// The closure sees a fresh copy on every attempt, so a transition
    /// that errors leaves the store untouched. A transition that leaves
    /// the copy unchanged (a duplicate release, a replayed resolution)
    /// commits nothing: no version bump, no contention with real
    /// mutations.
    fn update<R>(
        &self,
        order_id: OrderId,
        op: impl Fn(&mut EscrowState, Timestamp) -> Result<R, EscrowError>,
    ) -> Result<(EscrowState, R), EscrowError> {
        for attempt in 0..CAS_RETRIES {
            let current = self
                .store
                .load(order_id)?
                .ok_or(EscrowError::NotFound(order_id))?;
            let expected = current.version;
            let now = Timestamp::now();

            let mut next = current.clone();
            let outcome = op(&mut next, now)?;
            if next == current {
                return Ok((current, outcome));
            }
            next.version = expected + 1;
            next.updated_at = now;

            if self.store.compare_and_swap(expected, next.clone())? {
                return Ok((next, outcome));
            }
            warn!(%order_id, attempt, "escrow update lost optimistic-lock race, retrying");
        }
        Err(EscrowError::ConcurrentModification(order_id))
    }
}
