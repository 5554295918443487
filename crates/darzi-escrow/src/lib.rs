//! # darzi-escrow — Staged Escrow Ledger
//!
//! Owns the authoritative split of an order's total into deposit,
//! fitting, and final shares, and tracks what has been paid and released
//! per stage.
//!
//! - **Stage** (`stage.rs`): The `DEPOSIT → FITTING → FINAL → RELEASED`
//!   progression, plus the `REFUNDED` terminal reachable only through a
//!   full-refund dispute resolution.
//!
//! - **Policy** (`policy.rs`): Percentage split (default 25/50/25) and
//!   order-total bounds, with exact three-way allocation.
//!
//! - **State** (`state.rs`): The pure `EscrowState` machine with its
//!   append-only history log. All validation lives here; no I/O.
//!
//! - **Store** (`store.rs`): The `EscrowStore` seam with a
//!   version-checked compare-and-swap, plus the in-memory backing.
//!
//! - **Ledger** (`ledger.rs`): The `EscrowLedger` service orchestrating
//!   load → pure transition → CAS, with idempotent stage release.
//!
//! ## Crate Policy
//!
//! - `EscrowState` is mutated by this crate only. Milestone approval and
//!   dispute resolution reach it exclusively through [`EscrowLedger`]
//!   method contracts.
//! - Every mutation either fully commits (amounts + history entry) or
//!   leaves the stored state untouched.

pub mod ledger;
pub mod policy;
pub mod stage;
pub mod state;
pub mod store;

pub use ledger::EscrowLedger;
pub use policy::{EscrowConfig, OrderBounds, SplitPolicy, StageAllocation};
pub use stage::EscrowStage;
pub use state::{EscrowError, EscrowState, HistoryEntry, HistoryKind, LedgerResolution, ReleaseOutcome};
pub use store::{EscrowStore, MemoryEscrowStore};
