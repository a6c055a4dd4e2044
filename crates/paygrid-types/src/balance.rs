//! Cross-ledger balance types for PayGrid
//!
//! Balances live on three independently-failing ledgers: the custodial
//! wallet, the intermediate on-chain account, and the payment facility.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point-in-time read across all three ledgers
///
/// Never cached beyond one rebalance decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub custodial_available: Decimal,
    pub intermediate_available: Decimal,
    pub facility_available: Decimal,
    pub facility_total: Decimal,
}

/// Status of a custodial wallet transfer, as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Submitted, not yet in a terminal state
    Pending,
    /// Reached the chain; hash is present once indexed
    Complete { tx_hash: Option<crate::TxHash> },
    /// The provider reports the transfer failed
    Failed { reason: String },
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Payment facility balances as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityBalances {
    /// Spendable facility balance
    pub facility_available: Decimal,
    /// Total facility balance including amounts settling
    pub facility_total: Decimal,
    /// On-chain balance of the depositing wallet, as the gateway sees it
    pub wallet_available: Decimal,
}

/// Outcome of one rebalance cycle
///
/// Mid-cycle faults are not an outcome; they surface as errors to the
/// caller and the cycle produces no report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceOutcome {
    /// Facility was above threshold; nothing to do
    AboveThreshold,
    /// Another cycle was already in flight
    AlreadyRunning,
    /// Custodial funds below the minimum viable transfer amount
    InsufficientCustodial,
    /// Funds moved custodial -> intermediate -> facility
    Refilled,
}

/// Ephemeral run record for one rebalance cycle; not persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceCycle {
    pub id: Uuid,
    pub triggered_at: DateTime<Utc>,
    pub facility_before: Decimal,
    pub custodial_before: Decimal,
    pub amount_moved: Decimal,
    pub outcome: RebalanceOutcome,
}
