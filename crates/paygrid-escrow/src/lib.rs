//! PayGrid Escrow - Locked-fund lifecycle for a single task
//!
//! The engine is a stateless client of the escrow ledger: it holds no local
//! copy of escrow state, and every read goes to the ledger. The lifecycle it
//! drives is `None -> Locked -> Released`; the Refunded (deadline expiry)
//! and Disputed paths are external and terminal.
//!
//! Double release is prevented by the ledger rejecting a non-Locked release;
//! the remote ledger is the actual mutex, not this engine.

use paygrid_ledger::{AgentRegistry, CreateEscrowCall, EscrowLedger, ReleaseCall};
use paygrid_types::{
    AgentId, ChainAddress, EscrowId, EscrowRecord, EscrowStatus, PayGridError, Result, TaskHash,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Escrow settlement state machine over the ledger and registry seams
pub struct EscrowEngine {
    ledger: Arc<dyn EscrowLedger>,
    registry: Arc<dyn AgentRegistry>,
}

impl EscrowEngine {
    pub fn new(ledger: Arc<dyn EscrowLedger>, registry: Arc<dyn AgentRegistry>) -> Self {
        Self { ledger, registry }
    }

    /// Lowest-price active agent for a service type.
    ///
    /// The registry signals "none" with the zero agent id; that surfaces
    /// here as `NoProviderAvailable`. Price ties keep whatever the registry
    /// returned first.
    pub async fn find_cheapest_provider(
        &self,
        service_type: &str,
    ) -> Result<(AgentId, Decimal)> {
        let (agent_id, price) = self.registry.cheapest_agent(service_type).await?;
        if agent_id.is_sentinel() {
            return Err(PayGridError::NoProviderAvailable {
                service_type: service_type.to_string(),
            });
        }
        Ok((agent_id, price))
    }

    /// Lock `amount` against a new escrow and resolve its index.
    ///
    /// The ledger call returns only after on-chain confirmation; a revert or
    /// timeout surfaces as `LockFailed` with no partial lock observable. On
    /// success the new escrow is exactly `Locked` and the funds are held by
    /// the ledger, not the buyer.
    pub async fn create_escrow(
        &self,
        seller: ChainAddress,
        task_hash: TaskHash,
        seller_agent_id: AgentId,
        amount: Decimal,
    ) -> Result<EscrowId> {
        let call = CreateEscrowCall {
            seller,
            task_hash,
            seller_agent_id,
            value: amount,
        };
        if let Err(e) = self.ledger.create_escrow(call).await {
            warn!("Escrow lock failed: {e}");
            return Err(PayGridError::LockFailed {
                reason: e.to_string(),
            });
        }

        // The new escrow's index is the ledger's running count minus one.
        let count = self.ledger.escrow_count().await?;
        let id = EscrowId(count.saturating_sub(1));
        info!("Escrow {} locked, amount {}", id, amount);
        Ok(id)
    }

    /// Release a Locked escrow to its seller; `Released` is terminal.
    ///
    /// Fails with `InvalidStateTransition` for any other current status.
    /// The pre-check here is advisory; the ledger enforces the same rule on
    /// the release call itself, which is what prevents a double-release race.
    pub async fn release(&self, escrow_id: EscrowId) -> Result<()> {
        let record = self.get_escrow(escrow_id).await?;
        if record.status != EscrowStatus::Locked {
            return Err(PayGridError::InvalidStateTransition {
                escrow_id,
                status: record.status,
            });
        }

        self.ledger.release(ReleaseCall { escrow_id }).await?;
        info!("Escrow {} released to {}", escrow_id, record.seller);
        Ok(())
    }

    /// Read an agent record from the registry (payout wallet, active flag)
    pub async fn get_provider(&self, agent_id: AgentId) -> Result<paygrid_types::AgentRecord> {
        self.registry.agent(agent_id).await
    }

    /// Read-only escrow lookup; `NotFound` for indices >= the running count
    pub async fn get_escrow(&self, escrow_id: EscrowId) -> Result<EscrowRecord> {
        let count = self.ledger.escrow_count().await?;
        if escrow_id.as_u64() >= count {
            return Err(PayGridError::NotFound { escrow_id });
        }
        self.ledger.get_escrow(escrow_id).await
    }
}
