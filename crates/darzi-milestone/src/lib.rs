//! # darzi-milestone — Milestone Verification & Approval
//!
//! Owns the ordered production milestone sequence for an order, the
//! customer approval state machine over it, and the auto-approval sweep.
//!
//! - **Production** (`production.rs`): The fixed 7-step sequence from
//!   FABRIC_SELECTED to READY_FOR_DELIVERY, ordered by index, with the
//!   map of which steps gate an escrow stage release.
//!
//! - **Milestone** (`milestone.rs`): The `Milestone` record, its
//!   `ApprovalStatus`, evidence validation, and the append-only
//!   `MilestoneApproval` audit record.
//!
//! - **Tracker** (`tracker.rs`): Evidence submission with in-sequence
//!   enforcement and the pending-review lookup.
//!
//! - **Approval** (`approval.rs`): `ApprovalEngine` — the
//!   PENDING → {APPROVED, REJECTED, AUTO_APPROVED} machine. The
//!   compare-and-set commit of the terminal status is the linearization
//!   point; approval of a gating step then releases the mapped escrow
//!   stage, and rejection opens a dispute.
//!
//! - **Scheduler** (`scheduler.rs`): `AutoApprovalScheduler` — a
//!   cooperative periodic sweep that force-approves milestones past
//!   their 48-hour response window.
//!
//! ## Crate Policy
//!
//! - Sits at the top of the engine DAG: depends on darzi-escrow (stage
//!   release on approval) and darzi-dispute (case opened on rejection).
//! - Milestone records are mutated exactly once, PENDING → terminal;
//!   afterwards only the dispute reference may be attached.

pub mod approval;
pub mod milestone;
pub mod production;
pub mod scheduler;
pub mod store;
pub mod tracker;

pub use approval::{ApprovalEngine, ApprovalResult, AutoApprovalOutcome};
pub use milestone::{
    ApprovalAction, ApprovalStatus, EvidenceRef, Milestone, MilestoneApproval, MilestoneError,
    AUTO_APPROVAL_WINDOW_HOURS,
};
pub use production::ProductionStage;
pub use scheduler::{AutoApprovalScheduler, SweepError, SweepReport};
pub use store::{MemoryMilestoneStore, MilestoneStore};
pub use tracker::MilestoneTracker;
