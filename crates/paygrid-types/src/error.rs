//! Error types for PayGrid
//!
//! Ledger and contract failures surface as typed errors to the immediate
//! caller; nothing in the escrow path is retried automatically. The
//! rebalance confirmation poll is the one place with bounded internal retry.

use crate::{AgentId, EscrowId, EscrowStatus, TransferId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for PayGrid operations
pub type Result<T> = std::result::Result<T, PayGridError>;

/// PayGrid error types
#[derive(Debug, Clone, Error)]
pub enum PayGridError {
    // ========================================================================
    // Discovery Errors
    // ========================================================================

    /// No active provider is registered for the requested service type
    #[error("No active provider available for service type {service_type}")]
    NoProviderAvailable { service_type: String },

    // ========================================================================
    // Escrow Errors
    // ========================================================================

    /// The fund-locking transaction reverted or timed out
    #[error("Escrow lock failed: {reason}")]
    LockFailed { reason: String },

    /// The escrow is not in a state that permits the requested transition
    #[error("Invalid state transition for escrow {escrow_id}: status is {status}")]
    InvalidStateTransition {
        escrow_id: EscrowId,
        status: EscrowStatus,
    },

    /// No escrow exists at this index
    #[error("Escrow {escrow_id} not found")]
    NotFound { escrow_id: EscrowId },

    // ========================================================================
    // Rebalance Errors
    // ========================================================================

    /// The transfer did not reach a terminal state within the attempt cap
    #[error("Transfer {transfer_id} not confirmed after {attempts} attempts")]
    TransferTimeout {
        transfer_id: TransferId,
        attempts: u32,
    },

    /// The custodial provider reports the transfer failed
    #[error("Transfer {transfer_id} failed: {reason}")]
    TransferFailed {
        transfer_id: TransferId,
        reason: String,
    },

    /// Custodial funds are below the minimum viable transfer amount
    #[error("Insufficient custodial balance: available {available}, minimum viable {minimum}")]
    InsufficientCustodialBalance { available: Decimal, minimum: Decimal },

    // ========================================================================
    // Policy Errors
    // ========================================================================

    /// The agent is frozen by operator policy
    #[error("Agent {agent_id} is frozen by policy")]
    PolicyFrozen { agent_id: AgentId },

    // ========================================================================
    // Execution Errors
    // ========================================================================

    /// The external task executor failed after funds were locked; the escrow
    /// remains Locked and is not automatically refunded
    #[error("Task execution failed for escrow {escrow_id}: {reason}")]
    ExecutionFailed { escrow_id: EscrowId, reason: String },

    // ========================================================================
    // Adapter Errors
    // ========================================================================

    /// An I/O fault in a ledger adapter (HTTP, RPC, persistence)
    #[error("Ledger error: {message}")]
    Ledger { message: String },
}

impl PayGridError {
    /// Create a ledger adapter error
    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger {
            message: message.into(),
        }
    }

    /// Check if a later attempt may succeed without operator intervention
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::TransferTimeout { .. } | Self::Ledger { .. }
        )
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoProviderAvailable { .. } => "NO_PROVIDER_AVAILABLE",
            Self::LockFailed { .. } => "LOCK_FAILED",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::TransferTimeout { .. } => "TRANSFER_TIMEOUT",
            Self::TransferFailed { .. } => "TRANSFER_FAILED",
            Self::InsufficientCustodialBalance { .. } => "INSUFFICIENT_CUSTODIAL_BALANCE",
            Self::PolicyFrozen { .. } => "POLICY_FROZEN",
            Self::ExecutionFailed { .. } => "EXECUTION_FAILED",
            Self::Ledger { .. } => "LEDGER_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn error_codes() {
        let err = PayGridError::InsufficientCustodialBalance {
            available: dec!(0.5),
            minimum: dec!(1),
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_CUSTODIAL_BALANCE");
    }

    #[test]
    fn retriable_errors() {
        let timeout = PayGridError::TransferTimeout {
            transfer_id: TransferId::new("t-1"),
            attempts: 30,
        };
        assert!(timeout.is_retriable());

        let frozen = PayGridError::PolicyFrozen {
            agent_id: AgentId(2),
        };
        assert!(!frozen.is_retriable());
    }
}
