//! # Escrow Stage Progression
//!
//! ## States
//!
//! DEPOSIT → FITTING → FINAL → RELEASED
//!
//! REFUNDED is reachable from any payable stage, but only through a
//! full-refund dispute resolution — never through the normal release
//! path. RELEASED and REFUNDED are terminal.

use serde::{Deserialize, Serialize};

/// The portion of the order total currently held in escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStage {
    /// Awaiting/holding the deposit share.
    Deposit,
    /// Deposit released; holding the fitting share.
    Fitting,
    /// Fitting released; holding the final share.
    Final,
    /// All shares released to the tailor (terminal).
    Released,
    /// Order refunded through dispute resolution (terminal).
    Refunded,
}

impl EscrowStage {
    /// The canonical string name of this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Fitting => "FITTING",
            Self::Final => "FINAL",
            Self::Released => "RELEASED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Whether this stage is terminal (no further releases).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }

    /// Whether this stage holds a payable share.
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::Deposit | Self::Fitting | Self::Final)
    }

    /// Position in the forward progression. REFUNDED sits outside the
    /// normal sequence and compares as terminal.
    pub fn order_index(&self) -> u8 {
        match self {
            Self::Deposit => 0,
            Self::Fitting => 1,
            Self::Final => 2,
            Self::Released => 3,
            Self::Refunded => 3,
        }
    }

    /// The next stage in the forward progression, if one exists.
    ///
    /// No wildcard match — adding a variant must force a decision here.
    pub fn next(&self) -> Option<EscrowStage> {
        match self {
            Self::Deposit => Some(Self::Fitting),
            Self::Fitting => Some(Self::Final),
            Self::Final => Some(Self::Released),
            Self::Released | Self::Refunded => None,
        }
    }
}

impl std::fmt::Display for EscrowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
