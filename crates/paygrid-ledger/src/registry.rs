//! Agent registry contract adapter
//!
//! The registry tracks service agents and answers cheapest-active-provider
//! queries. The sentinel agent id 0 signals "no provider".

use async_trait::async_trait;
use paygrid_types::{AgentId, AgentRecord, ChainAddress, PayGridError, Result};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Typed access to the agent registry contract
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Lowest-price active agent for a service type, or the zero sentinel.
    ///
    /// Tie-break among equal prices is whatever the registry returns first;
    /// inherited contract behavior, not a guarantee.
    async fn cheapest_agent(&self, service_type: &str) -> Result<(AgentId, Decimal)>;

    /// Read an agent record
    async fn agent(&self, id: AgentId) -> Result<AgentRecord>;

    /// Resolve an agent id from its payout wallet
    async fn agent_id_by_wallet(&self, wallet: &ChainAddress) -> Result<AgentId>;

    /// Register a new agent; returns the assigned id
    async fn register_agent(
        &self,
        wallet: ChainAddress,
        name: &str,
        service_type: &str,
        price_per_task: Decimal,
    ) -> Result<AgentId>;
}

/// In-memory agent registry
///
/// Agents are stored in id order; the cheapest query scans ascending ids so
/// the first-listed agent wins price ties, matching contract iteration order.
pub struct MemoryAgentRegistry {
    agents: Arc<RwLock<BTreeMap<AgentId, AgentRecord>>>,
}

impl MemoryAgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Flip an agent's active flag (operator/test helper)
    pub async fn set_active(&self, id: AgentId, active: bool) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&id)
            .ok_or_else(|| PayGridError::ledger(format!("unknown agent {id}")))?;
        agent.active = active;
        Ok(())
    }

    /// Whether an agent exists and is active
    pub async fn is_active(&self, id: AgentId) -> bool {
        self.agents
            .read()
            .await
            .get(&id)
            .map(|a| a.active)
            .unwrap_or(false)
    }
}

impl Default for MemoryAgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRegistry for MemoryAgentRegistry {
    async fn cheapest_agent(&self, service_type: &str) -> Result<(AgentId, Decimal)> {
        let agents = self.agents.read().await;
        let mut cheapest: Option<(AgentId, Decimal)> = None;
        for (id, agent) in agents.iter() {
            if !agent.active || agent.service_type != service_type {
                continue;
            }
            let beats = match cheapest {
                Some((_, price)) => agent.price_per_task < price,
                None => true,
            };
            if beats {
                cheapest = Some((*id, agent.price_per_task));
            }
        }
        Ok(cheapest.unwrap_or((AgentId::SENTINEL, Decimal::ZERO)))
    }

    async fn agent(&self, id: AgentId) -> Result<AgentRecord> {
        self.agents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PayGridError::ledger(format!("unknown agent {id}")))
    }

    async fn agent_id_by_wallet(&self, wallet: &ChainAddress) -> Result<AgentId> {
        let agents = self.agents.read().await;
        let id = agents
            .iter()
            .find(|(_, agent)| &agent.wallet == wallet)
            .map(|(id, _)| *id)
            .unwrap_or(AgentId::SENTINEL);
        Ok(id)
    }

    async fn register_agent(
        &self,
        wallet: ChainAddress,
        name: &str,
        service_type: &str,
        price_per_task: Decimal,
    ) -> Result<AgentId> {
        let mut agents = self.agents.write().await;
        // Ids start at 1; 0 is the no-provider sentinel.
        let id = AgentId(agents.keys().last().map(|id| id.0).unwrap_or(0) + 1);
        agents.insert(
            id,
            AgentRecord {
                wallet,
                name: name.to_string(),
                service_type: service_type.to_string(),
                price_per_task,
                reputation: 0,
                tasks_completed: 0,
                active: true,
            },
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn registry_with(prices: &[(&str, Decimal)]) -> MemoryAgentRegistry {
        let registry = MemoryAgentRegistry::new();
        for (name, price) in prices {
            registry
                .register_agent(
                    ChainAddress::new(format!("0x{name}")),
                    name,
                    "text-generation",
                    *price,
                )
                .await
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn cheapest_picks_lowest_price() {
        let registry = registry_with(&[
            ("alpha", dec!(0.05)),
            ("beta", dec!(0.01)),
            ("gamma", dec!(0.03)),
        ])
        .await;
        let (id, price) = registry.cheapest_agent("text-generation").await.unwrap();
        assert_eq!(id, AgentId(2));
        assert_eq!(price, dec!(0.01));
    }

    #[tokio::test]
    async fn cheapest_skips_inactive_agents() {
        let registry = registry_with(&[("alpha", dec!(0.05)), ("beta", dec!(0.01))]).await;
        registry.set_active(AgentId(2), false).await.unwrap();
        let (id, price) = registry.cheapest_agent("text-generation").await.unwrap();
        assert_eq!(id, AgentId(1));
        assert_eq!(price, dec!(0.05));
    }

    #[tokio::test]
    async fn no_provider_yields_sentinel() {
        let registry = registry_with(&[]).await;
        let (id, _) = registry.cheapest_agent("text-generation").await.unwrap();
        assert!(id.is_sentinel());
    }

    #[tokio::test]
    async fn equal_prices_keep_first_listed() {
        let registry = registry_with(&[("alpha", dec!(0.02)), ("beta", dec!(0.02))]).await;
        let (id, _) = registry.cheapest_agent("text-generation").await.unwrap();
        assert_eq!(id, AgentId(1));
    }

    #[tokio::test]
    async fn wallet_lookup_resolves_id() {
        let registry = registry_with(&[("alpha", dec!(0.02))]).await;
        let id = registry
            .agent_id_by_wallet(&ChainAddress::new("0xalpha"))
            .await
            .unwrap();
        assert_eq!(id, AgentId(1));

        let missing = registry
            .agent_id_by_wallet(&ChainAddress::new("0xnobody"))
            .await
            .unwrap();
        assert!(missing.is_sentinel());
    }
}
