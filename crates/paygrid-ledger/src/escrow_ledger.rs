//! Escrow ledger contract adapter
//!
//! Calls are a small fixed set of strongly-typed structs, one per contract
//! method in use. The ledger is the sole source of truth for escrow state;
//! its rejection of a non-Locked release is the system's actual mutex
//! against double release.

use crate::MemoryAgentRegistry;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use paygrid_types::{
    AgentId, ChainAddress, EscrowId, EscrowRecord, EscrowStatus, PayGridError, Result, TaskHash,
    TxHash,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// `createEscrow(seller, taskHash, sellerAgentId) payable`
#[derive(Debug, Clone)]
pub struct CreateEscrowCall {
    pub seller: ChainAddress,
    pub task_hash: TaskHash,
    pub seller_agent_id: AgentId,
    /// Payment attached to the call; becomes the locked amount
    pub value: Decimal,
}

/// `release(escrowId)`
#[derive(Debug, Clone, Copy)]
pub struct ReleaseCall {
    pub escrow_id: EscrowId,
}

/// Typed access to the escrow ledger contract
///
/// Write calls return only after on-chain confirmation; a revert or
/// confirmation timeout surfaces as an error with no partially-applied
/// state observable.
#[async_trait]
pub trait EscrowLedger: Send + Sync {
    /// Lock `call.value` against a new escrow; confirmed on return
    async fn create_escrow(&self, call: CreateEscrowCall) -> Result<TxHash>;

    /// Release a Locked escrow to its seller; reverts otherwise
    async fn release(&self, call: ReleaseCall) -> Result<TxHash>;

    /// Read an escrow record; `NotFound` for indices >= `escrow_count`
    async fn get_escrow(&self, id: EscrowId) -> Result<EscrowRecord>;

    /// Running count of escrows ever created
    async fn escrow_count(&self) -> Result<u64>;
}

/// Window before the external refund path may reclaim locked funds
const ESCROW_DEADLINE_HOURS: i64 = 24;

/// In-memory escrow ledger
///
/// Enforces the contract's own checks: value must be positive, the seller
/// agent must be active in the linked registry, and release reverts unless
/// the escrow is Locked.
pub struct MemoryEscrowLedger {
    /// Address the ledger attributes lock calls to (the signing buyer)
    signer: ChainAddress,
    escrows: Arc<RwLock<Vec<EscrowRecord>>>,
    registry: Option<Arc<MemoryAgentRegistry>>,
    fail_next_lock: Arc<RwLock<bool>>,
}

impl MemoryEscrowLedger {
    pub fn new(signer: ChainAddress) -> Self {
        Self {
            signer,
            escrows: Arc::new(RwLock::new(Vec::new())),
            registry: None,
            fail_next_lock: Arc::new(RwLock::new(false)),
        }
    }

    /// Link a registry so lock calls revert for inactive seller agents
    pub fn with_registry(mut self, registry: Arc<MemoryAgentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Make the next lock call revert (test helper)
    pub async fn set_fail_next_lock(&self) {
        *self.fail_next_lock.write().await = true;
    }

    /// Drive the external deadline-expiry refund path (test helper)
    pub async fn force_refund(&self, id: EscrowId) -> Result<()> {
        let mut escrows = self.escrows.write().await;
        let escrow = escrows
            .get_mut(id.as_u64() as usize)
            .ok_or(PayGridError::NotFound { escrow_id: id })?;
        escrow.status = EscrowStatus::Refunded;
        Ok(())
    }

    /// Drive the external dispute path (test helper)
    pub async fn force_dispute(&self, id: EscrowId) -> Result<()> {
        let mut escrows = self.escrows.write().await;
        let escrow = escrows
            .get_mut(id.as_u64() as usize)
            .ok_or(PayGridError::NotFound { escrow_id: id })?;
        escrow.status = EscrowStatus::Disputed;
        Ok(())
    }
}

#[async_trait]
impl EscrowLedger for MemoryEscrowLedger {
    async fn create_escrow(&self, call: CreateEscrowCall) -> Result<TxHash> {
        if *self.fail_next_lock.read().await {
            *self.fail_next_lock.write().await = false;
            return Err(PayGridError::ledger("execution reverted"));
        }
        if call.value <= Decimal::ZERO {
            return Err(PayGridError::ledger("execution reverted: zero value"));
        }
        if let Some(registry) = &self.registry {
            if !registry.is_active(call.seller_agent_id).await {
                return Err(PayGridError::ledger(format!(
                    "execution reverted: agent {} not active",
                    call.seller_agent_id
                )));
            }
        }

        let mut escrows = self.escrows.write().await;
        let id = EscrowId(escrows.len() as u64);
        escrows.push(EscrowRecord {
            buyer: self.signer.clone(),
            seller: call.seller,
            amount: call.value,
            task_hash: call.task_hash,
            deadline: Utc::now() + Duration::hours(ESCROW_DEADLINE_HOURS),
            seller_agent_id: call.seller_agent_id,
            status: EscrowStatus::Locked,
        });
        info!("Escrow {} locked for {}", id, call.value);
        Ok(TxHash::new(format!("0xlock-{id}")))
    }

    async fn release(&self, call: ReleaseCall) -> Result<TxHash> {
        let mut escrows = self.escrows.write().await;
        let escrow = escrows
            .get_mut(call.escrow_id.as_u64() as usize)
            .ok_or(PayGridError::NotFound {
                escrow_id: call.escrow_id,
            })?;
        if escrow.status != EscrowStatus::Locked {
            return Err(PayGridError::InvalidStateTransition {
                escrow_id: call.escrow_id,
                status: escrow.status,
            });
        }
        escrow.status = EscrowStatus::Released;
        info!("Escrow {} released to {}", call.escrow_id, escrow.seller);
        Ok(TxHash::new(format!("0xrelease-{}", call.escrow_id)))
    }

    async fn get_escrow(&self, id: EscrowId) -> Result<EscrowRecord> {
        self.escrows
            .read()
            .await
            .get(id.as_u64() as usize)
            .cloned()
            .ok_or(PayGridError::NotFound { escrow_id: id })
    }

    async fn escrow_count(&self) -> Result<u64> {
        Ok(self.escrows.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AgentRegistry;
    use rust_decimal_macros::dec;

    fn lock_call(agent: AgentId) -> CreateEscrowCall {
        CreateEscrowCall {
            seller: ChainAddress::new("0xseller"),
            task_hash: TaskHash::new("deadbeef"),
            seller_agent_id: agent,
            value: dec!(0.01),
        }
    }

    #[tokio::test]
    async fn lock_then_release_is_terminal() {
        let ledger = MemoryEscrowLedger::new(ChainAddress::new("0xbuyer"));
        ledger.create_escrow(lock_call(AgentId(1))).await.unwrap();

        let id = EscrowId(0);
        assert_eq!(
            ledger.get_escrow(id).await.unwrap().status,
            EscrowStatus::Locked
        );

        ledger.release(ReleaseCall { escrow_id: id }).await.unwrap();
        assert_eq!(
            ledger.get_escrow(id).await.unwrap().status,
            EscrowStatus::Released
        );

        // Second release reverts; the ledger is the mutex.
        let err = ledger.release(ReleaseCall { escrow_id: id }).await.unwrap_err();
        assert!(matches!(err, PayGridError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn zero_value_lock_reverts() {
        let ledger = MemoryEscrowLedger::new(ChainAddress::new("0xbuyer"));
        let mut call = lock_call(AgentId(1));
        call.value = Decimal::ZERO;
        assert!(ledger.create_escrow(call).await.is_err());
        assert_eq!(ledger.escrow_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn inactive_agent_lock_reverts() {
        let registry = Arc::new(MemoryAgentRegistry::new());
        let agent = registry
            .register_agent(ChainAddress::new("0xseller"), "s", "text-generation", dec!(0.01))
            .await
            .unwrap();
        registry.set_active(agent, false).await.unwrap();

        let ledger =
            MemoryEscrowLedger::new(ChainAddress::new("0xbuyer")).with_registry(registry);
        assert!(ledger.create_escrow(lock_call(agent)).await.is_err());
    }

    #[tokio::test]
    async fn read_past_count_is_not_found() {
        let ledger = MemoryEscrowLedger::new(ChainAddress::new("0xbuyer"));
        let err = ledger.get_escrow(EscrowId(3)).await.unwrap_err();
        assert!(matches!(err, PayGridError::NotFound { .. }));
    }

    #[tokio::test]
    async fn refunded_escrow_rejects_release() {
        let ledger = MemoryEscrowLedger::new(ChainAddress::new("0xbuyer"));
        ledger.create_escrow(lock_call(AgentId(1))).await.unwrap();
        ledger.force_refund(EscrowId(0)).await.unwrap();

        let err = ledger
            .release(ReleaseCall { escrow_id: EscrowId(0) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PayGridError::InvalidStateTransition {
                status: EscrowStatus::Refunded,
                ..
            }
        ));
    }
}
