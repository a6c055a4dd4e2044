//! Escrow types for PayGrid
//!
//! An escrow holds a buyer's funds on the escrow ledger pending task
//! completion. The ledger is the sole source of truth; these records are
//! point-in-time reads of on-chain state.

use crate::{AgentId, ChainAddress, TaskHash};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Status of an escrow
///
/// Lifecycle: `None -> Locked -> {Released | Refunded | Disputed}`.
/// `Refunded` (deadline expiry) and `Disputed` are driven by external
/// paths, never by this core. All three end states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// No escrow exists at this index
    None,
    /// Buyer funds are held by the ledger
    Locked,
    /// Funds moved to the seller
    Released,
    /// Funds returned to the buyer after deadline expiry
    Refunded,
    /// Awaiting external dispute resolution
    Disputed,
}

impl EscrowStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded | Self::Disputed)
    }

    /// Check if funds are currently held by the ledger
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked | Self::Disputed)
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Locked => "locked",
            Self::Released => "released",
            Self::Refunded => "refunded",
            Self::Disputed => "disputed",
        };
        write!(f, "{s}")
    }
}

/// An escrow record as read from the escrow ledger
///
/// `amount` and `task_hash` are immutable once the escrow is Locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    /// Address that funded the escrow
    pub buyer: ChainAddress,
    /// Address that receives on release
    pub seller: ChainAddress,
    /// Amount held by the ledger
    pub amount: Decimal,
    /// Content-derived identifier binding this escrow to one task
    pub task_hash: TaskHash,
    /// After this time the external refund path may reclaim funds
    pub deadline: DateTime<Utc>,
    /// Registry index of the selling agent
    pub seller_agent_id: AgentId,
    /// Current lifecycle status
    pub status: EscrowStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!EscrowStatus::None.is_terminal());
        assert!(!EscrowStatus::Locked.is_terminal());
        assert!(EscrowStatus::Released.is_terminal());
        assert!(EscrowStatus::Refunded.is_terminal());
        assert!(EscrowStatus::Disputed.is_terminal());
    }

    #[test]
    fn locked_states_hold_funds() {
        assert!(EscrowStatus::Locked.is_locked());
        assert!(EscrowStatus::Disputed.is_locked());
        assert!(!EscrowStatus::Released.is_locked());
        assert!(!EscrowStatus::None.is_locked());
    }
}
