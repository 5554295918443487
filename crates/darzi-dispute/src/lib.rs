//! # darzi-dispute — Dispute Escalation
//!
//! Carries disagreements between customer and tailor through an
//! SLA-clocked case lifecycle. A dispute's resolution is the *only*
//! path that can mutate the escrow ledger outside the normal stage
//! sequence.
//!
//! - **Dispute** (`dispute.rs`): Status/category/priority enums, the
//!   priority→SLA table, and the `Dispute`/`DisputeResolution` records.
//!
//! - **Service** (`service.rs`): `DisputeService` — open, assign,
//!   resolve, escalate, close, plus the advisory SLA sweep.
//!
//! - **Store** (`store.rs`): The `DisputeStore` seam with a
//!   version-checked compare-and-swap, plus the in-memory backing.
//!
//! ## Lifecycle
//!
//! ```text
//! OPEN ──assign()──▶ IN_PROGRESS ──resolve()──▶ RESOLVED ──close()──▶ CLOSED
//!   │                     │
//!   └──────resolve()──────┤
//!   └─────escalate()──────┴──escalate()──▶ ESCALATED ──close()──▶ CLOSED
//! ```
//!
//! SLA deadlines are advisory: they drive `SlaWarning` events, never
//! auto-resolution. An overdue dispute stays where it is until an admin
//! acts.

pub mod dispute;
pub mod service;
pub mod store;

pub use dispute::{
    Dispute, DisputeCategory, DisputePriority, DisputeResolution, DisputeStatus, ResolutionType,
};
pub use service::{DisputeError, DisputeService, OpenDispute};
pub use store::{DisputeStore, MemoryDisputeStore};
