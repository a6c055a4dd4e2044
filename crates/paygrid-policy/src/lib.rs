//! PayGrid Policy - Seller admission control
//!
//! The gate consults the per-agent policy record before any payment
//! verification work: there is no point verifying a payment signature for an
//! agent that cannot legally serve the request regardless of payment
//! validity.
//!
//! Checks are stateless per call. Caching a decision across requests would
//! serve stale-unfrozen responses after an operator freezes an agent.

use async_trait::async_trait;
use chrono::Utc;
use paygrid_types::{AgentId, GateDecision, PayGridError, PolicyRecord, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// HTTP status returned for a frozen agent
pub const FROZEN_STATUS: u16 = 403;

/// Read access to the external policy store
///
/// Records are written by an external admin action, never by this core.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// The current record for an agent, if one exists
    async fn record(&self, agent_id: AgentId) -> Result<Option<PolicyRecord>>;
}

/// In-memory policy store
#[derive(Default)]
pub struct MemoryPolicyStore {
    records: Arc<RwLock<HashMap<AgentId, PolicyRecord>>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an agent's frozen flag (models the external admin action)
    pub async fn set_frozen(&self, agent_id: AgentId, frozen: bool) {
        self.records.write().await.insert(
            agent_id,
            PolicyRecord {
                agent_id,
                frozen,
                updated_at: Utc::now(),
            },
        );
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn record(&self, agent_id: AgentId) -> Result<Option<PolicyRecord>> {
        Ok(self.records.read().await.get(&agent_id).cloned())
    }
}

/// Admission check preceding payment verification on protected endpoints
pub struct SellerPolicyGate {
    store: Arc<dyn PolicyStore>,
}

impl SellerPolicyGate {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Decide whether a protected request for `agent_id` may proceed.
    ///
    /// A frozen record denies with 403 before any payment-verification work.
    /// No record on file means no restriction.
    pub async fn check(&self, agent_id: AgentId, endpoint: &str) -> Result<GateDecision> {
        match self.store.record(agent_id).await? {
            Some(record) if record.frozen => {
                warn!("Agent {} frozen; rejecting {}", agent_id, endpoint);
                Ok(GateDecision::deny(
                    FROZEN_STATUS,
                    format!("agent {agent_id} is frozen"),
                ))
            }
            _ => Ok(GateDecision::allow()),
        }
    }

    /// `check`, with a denial surfaced as a typed error.
    ///
    /// Handlers that have no use for the decision detail call this and let
    /// their error mapping produce the 403.
    pub async fn enforce(&self, agent_id: AgentId, endpoint: &str) -> Result<()> {
        let decision = self.check(agent_id, endpoint).await?;
        if decision.allowed {
            Ok(())
        } else {
            Err(PayGridError::PolicyFrozen { agent_id })
        }
    }
}
