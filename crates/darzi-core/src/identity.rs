//! # Domain Identity Newtypes
//!
//! Newtype wrappers for all domain identifiers in the Darzi engine.
//! These prevent accidental identifier confusion — you cannot pass a
//! `MilestoneId` where an `OrderId` is expected.
//!
//! The one non-random identifier is [`ActorId::system()`]: the acting
//! party recorded on auto-approvals. It is the nil UUID so that
//! system-attributed decisions are stable across restarts and trivially
//! recognizable in audit queries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a customer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

/// Unique identifier for a production milestone attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MilestoneId(pub Uuid);

/// Unique identifier for a milestone approval audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub Uuid);

/// Unique identifier for a dispute case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisputeId(pub Uuid);

/// Identifier of an acting party (customer, tailor, admin, or system).
///
/// Supplied by the external identity layer; the engine trusts that the
/// caller has already authorized the action for the given order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

/// The role of an acting party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// The customer who placed and pays for the order.
    Customer,
    /// The tailor producing the garment.
    Tailor,
    /// Platform staff handling disputes and escalations.
    Admin,
    /// The engine itself (auto-approval sweep).
    System,
}

macro_rules! impl_id {
    ($name:ident, $prefix:literal) => {
        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

impl_id!(OrderId, "order");
impl_id!(MilestoneId, "milestone");
impl_id!(ApprovalId, "approval");
impl_id!(DisputeId, "dispute");
impl_id!(ActorId, "actor");

impl ActorId {
    /// The system actor recorded on auto-approved milestones.
    ///
    /// Nil UUID — deterministic, so audit queries can distinguish
    /// system decisions from human ones without a join.
    pub fn system() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the system actor.
    pub fn is_system(&self) -> bool {
        self.0.is_nil()
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Customer => "customer",
            Self::Tailor => "tailor",
            Self::Admin => "admin",
            Self::System => "system",
        };
        f.write_str(s)
    }
}
