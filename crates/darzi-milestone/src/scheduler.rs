//! # Auto-Approval Sweep
//!
//! A periodic background sweep that force-approves PENDING milestones
//! whose 48-hour response window has elapsed. Each due milestone is
//! attempted independently: one failed release neither aborts the
//! sweep nor blocks the other orders, and a milestone the customer
//! decided between the query and the attempt is skipped quietly.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use darzi_core::{MilestoneId, Timestamp};

use crate::approval::{ApprovalEngine, AutoApprovalOutcome};
use crate::milestone::MilestoneError;
use crate::store::MilestoneStore;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// A per-milestone failure inside a sweep.
#[derive(Debug)]
pub struct SweepError {
    /// The milestone the attempt was for.
    pub milestone_id: MilestoneId,
    /// What went wrong.
    pub error: MilestoneError,
}

/// What one sweep pass did.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Milestones the deadline query returned.
    pub due: usize,
    /// Milestones force-approved this pass.
    pub auto_approved: usize,
    /// Milestones skipped because a decision landed first.
    pub skipped: usize,
    /// Attempts that errored; retried on the next pass.
    pub failures: Vec<SweepError>,
}

/// Periodic driver for the auto-approval sweep.
pub struct AutoApprovalScheduler {
    engine: Arc<ApprovalEngine>,
    store: Arc<dyn MilestoneStore>,
    interval: Duration,
}

impl AutoApprovalScheduler {
    /// Build a scheduler sweeping at [`DEFAULT_SWEEP_INTERVAL`].
    pub fn new(engine: Arc<ApprovalEngine>, store: Arc<dyn MilestoneStore>) -> Self {
        Self::with_interval(engine, store, DEFAULT_SWEEP_INTERVAL)
    }

    /// Build a scheduler with an explicit sweep interval.
    pub fn with_interval(
        engine: Arc<ApprovalEngine>,
        store: Arc<dyn MilestoneStore>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            interval,
        }
    }

    /// One sweep pass over everything past its deadline at `now`.
    pub fn sweep(&self, now: Timestamp) -> Result<SweepReport, MilestoneError> {
        let due = self.store.pending_past_deadline(now)?;
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };

        for milestone in due {
            match self.engine.auto_approve(milestone.id, now) {
                Ok(AutoApprovalOutcome::Applied(_)) => report.auto_approved += 1,
                Ok(AutoApprovalOutcome::AlreadyDecided(status)) => {
                    debug!(milestone_id = %milestone.id, %status, "sweep skipped decided milestone");
                    report.skipped += 1;
                }
                // The query said due; a later clock cannot make it less due.
                Ok(AutoApprovalOutcome::NotDue) => report.skipped += 1,
                Err(err) => {
                    error!(milestone_id = %milestone.id, %err, "auto-approval failed");
                    report.failures.push(SweepError {
                        milestone_id: milestone.id,
                        error: err,
                    });
                }
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                auto_approved = report.auto_approved,
                skipped = report.skipped,
                failed = report.failures.len(),
                "auto-approval sweep complete"
            );
        }
        Ok(report)
    }

    /// Run sweeps until the token is cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup does not
        // race order bootstrapping.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("auto-approval scheduler stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep(Timestamp::now()) {
                        error!(%err, "auto-approval sweep aborted");
                    }
                }
            }
        }
    }
}
