//! Agent registry types for PayGrid

use crate::ChainAddress;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An agent record as read from the on-chain registry
///
/// Read-only from this core's perspective except registration. Inactive or
/// policy-frozen agents must never be selected by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Payout wallet address
    pub wallet: ChainAddress,
    /// Human-readable agent name
    pub name: String,
    /// Service category the agent serves (e.g. "text-generation")
    pub service_type: String,
    /// Per-task price in marketplace token units
    pub price_per_task: Decimal,
    /// Registry-maintained reputation score
    pub reputation: u64,
    /// Count of settled tasks
    pub tasks_completed: u64,
    /// Whether the agent accepts new tasks
    pub active: bool,
}

/// Service type served by text-producing agents; the settlement pipeline
/// discovers providers under this category.
pub const SERVICE_TEXT_GENERATION: &str = "text-generation";
