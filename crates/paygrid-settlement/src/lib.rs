//! PayGrid Settlement - Buyer query to locked escrow to produced result
//!
//! The coordinator composes the escrow engine with an external execution
//! collaborator: resolve the cheapest provider, lock funds, run the task,
//! return the result. Release after output acceptance is the caller's
//! responsibility.
//!
//! # Known limitation
//!
//! A task that fails *after* the lock leaves the escrow `Locked` with the
//! buyer's funds committed; this core does not release or refund on
//! execution failure. The buyer has already paid, and recovering a
//! failed-but-paid task is the manual/dispute path, which is out of scope
//! here. The failure is surfaced as `ExecutionFailed`, never swallowed.

use async_trait::async_trait;
use paygrid_escrow::EscrowEngine;
use paygrid_types::{
    AgentId, EscrowId, PayGridError, Result, TaskHash, SERVICE_TEXT_GENERATION,
};
use rand::Rng;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

/// External execution collaborator (the response-generation engine).
///
/// May suspend for an unbounded external duration; the coordinator does not
/// impose a timeout.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> std::result::Result<String, String>;
}

/// Outcome of one settled (or lock-committed) task
#[derive(Debug, Clone)]
pub struct TaskSettlement {
    pub result: String,
    pub cost: Decimal,
    pub provider_id: AgentId,
    pub escrow_id: EscrowId,
}

/// Derive a content-bound task identifier without revealing the query
/// on-chain: hex(sha256(query || nonce)).
pub fn task_hash(query: &str, nonce: u64) -> TaskHash {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update(nonce.to_be_bytes());
    TaskHash::new(hex::encode(hasher.finalize()))
}

/// Coordinates provider discovery, escrow lock, and task execution
pub struct TaskSettlementCoordinator {
    engine: Arc<EscrowEngine>,
    executor: Arc<dyn TaskExecutor>,
}

impl TaskSettlementCoordinator {
    pub fn new(engine: Arc<EscrowEngine>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self { engine, executor }
    }

    /// Turn a buyer query into a locked escrow and a produced result.
    ///
    /// The lock always commits before execution is attempted; on executor
    /// failure the escrow stays `Locked` and `ExecutionFailed` carries its
    /// id so the buyer sees exactly what was paid for.
    pub async fn process_query(&self, query: &str) -> Result<TaskSettlement> {
        let (provider_id, price) = self
            .engine
            .find_cheapest_provider(SERVICE_TEXT_GENERATION)
            .await?;
        let provider = self.engine.get_provider(provider_id).await?;

        let nonce: u64 = rand::thread_rng().gen();
        let hash = task_hash(query, nonce);

        let escrow_id = self
            .engine
            .create_escrow(provider.wallet.clone(), hash, provider_id, price)
            .await?;
        info!(
            "Query bound to escrow {} with provider {} at {}",
            escrow_id, provider_id, price
        );

        match self.executor.execute(query).await {
            Ok(result) => Ok(TaskSettlement {
                result,
                cost: price,
                provider_id,
                escrow_id,
            }),
            Err(reason) => {
                // Funds stay locked; recovery is the manual/dispute path.
                warn!(
                    "Execution failed for escrow {}; funds remain locked: {}",
                    escrow_id, reason
                );
                Err(PayGridError::ExecutionFailed { escrow_id, reason })
            }
        }
    }

    /// Accept the produced output and release the locked funds to the seller
    pub async fn accept(&self, escrow_id: EscrowId) -> Result<()> {
        self.engine.release(escrow_id).await
    }
}
