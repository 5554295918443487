//! # darzi-core — Foundational Types
//!
//! Shared primitives for the Darzi escrow engine:
//!
//! - **Identity** (`identity.rs`): Newtype wrappers for every domain
//!   identifier (`OrderId`, `MilestoneId`, `ApprovalId`, `DisputeId`,
//!   `ActorId`) plus the `ActorRole` taxonomy. You cannot pass a
//!   `MilestoneId` where a `DisputeId` is expected.
//!
//! - **Temporal** (`temporal.rs`): UTC-only `Timestamp` truncated to
//!   whole seconds, with deadline arithmetic. Deadline comparison is the
//!   backbone of auto-approval and SLA tracking, so ordering must be
//!   total and timezone-free.
//!
//! - **Money** (`money.rs`): Fixed-point amounts as integer minor units.
//!   Floats never enter ledger arithmetic.
//!
//! - **Events** (`event.rs`): The `DomainEvent` enum and `EventSink`
//!   seam through which the engine notifies external delivery channels
//!   (SMS/WhatsApp/push). Delivery is fire-and-forget — a sink failure
//!   never rolls back ledger state.
//!
//! ## Crate Policy
//!
//! - No dependencies on other darzi crates — this is the leaf.
//! - All public types derive `serde` for the persistence/API seam.

pub mod event;
pub mod identity;
pub mod money;
pub mod temporal;

pub use event::{DomainEvent, EventSink, MemorySink, TracingSink};
pub use identity::{ActorId, ActorRole, ApprovalId, DisputeId, MilestoneId, OrderId};
pub use money::Money;
pub use temporal::{Timestamp, TimestampError};
