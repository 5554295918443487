//! # Production Stage Sequence
//!
//! The fixed 7-step garment production sequence. Ordering is enforced
//! by index comparison on the canonical [`ProductionStage::ALL`] array —
//! each step's predecessor must be approved before the step can be
//! submitted.
//!
//! Three steps gate an escrow stage release; the other four are
//! approval-only checkpoints with no ledger effect:
//!
//! | Step | Releases |
//! |------|----------|
//! | FABRIC_SELECTED | DEPOSIT |
//! | FITTING_READY | FITTING |
//! | READY_FOR_DELIVERY | FINAL |

use serde::{Deserialize, Serialize};

use darzi_escrow::EscrowStage;

/// A named checkpoint in garment production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductionStage {
    /// Fabric chosen and purchased.
    FabricSelected,
    /// Pieces cut from the pattern.
    Cutting,
    /// Garment assembled.
    Assembly,
    /// Ready for the customer fitting.
    FittingReady,
    /// Post-fitting adjustments done.
    Adjustments,
    /// Pressed and finished.
    Pressing,
    /// Packed and ready for delivery.
    ReadyForDelivery,
}

/// Total number of production steps. Used for compile-time assertions.
pub const PRODUCTION_STAGE_COUNT: usize = 7;

impl ProductionStage {
    /// All 7 steps in canonical production order.
    pub const ALL: [ProductionStage; PRODUCTION_STAGE_COUNT] = [
        Self::FabricSelected,
        Self::Cutting,
        Self::Assembly,
        Self::FittingReady,
        Self::Adjustments,
        Self::Pressing,
        Self::ReadyForDelivery,
    ];

    /// The canonical string name of this step.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FabricSelected => "FABRIC_SELECTED",
            Self::Cutting => "CUTTING",
            Self::Assembly => "ASSEMBLY",
            Self::FittingReady => "FITTING_READY",
            Self::Adjustments => "ADJUSTMENTS",
            Self::Pressing => "PRESSING",
            Self::ReadyForDelivery => "READY_FOR_DELIVERY",
        }
    }

    /// Position in the production order.
    pub fn index(&self) -> usize {
        match self {
            Self::FabricSelected => 0,
            Self::Cutting => 1,
            Self::Assembly => 2,
            Self::FittingReady => 3,
            Self::Adjustments => 4,
            Self::Pressing => 5,
            Self::ReadyForDelivery => 6,
        }
    }

    /// The step immediately before this one, if any.
    pub fn predecessor(&self) -> Option<ProductionStage> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// The escrow stage this step's approval releases, if it gates one.
    ///
    /// No wildcard — a new step must state whether it gates a release.
    pub fn gated_escrow_stage(&self) -> Option<EscrowStage> {
        match self {
            Self::FabricSelected => Some(EscrowStage::Deposit),
            Self::FittingReady => Some(EscrowStage::Fitting),
            Self::ReadyForDelivery => Some(EscrowStage::Final),
            Self::Cutting | Self::Assembly | Self::Adjustments | Self::Pressing => None,
        }
    }
}

impl std::fmt::Display for ProductionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
