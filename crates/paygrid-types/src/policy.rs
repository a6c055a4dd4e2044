//! Seller policy types for PayGrid
//!
//! Policy records are written by an external admin action; this core only
//! reads them. A frozen agent cannot serve protected requests regardless of
//! payment validity.

use crate::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-agent policy record from the external policy store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub agent_id: AgentId,
    pub frozen: bool,
    pub updated_at: DateTime<Utc>,
}

/// Result of an admission check on a protected route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Whether the request may proceed to payment verification
    pub allowed: bool,
    /// HTTP status to return when denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Human-readable denial reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GateDecision {
    /// Create an allowing decision
    pub fn allow() -> Self {
        Self {
            allowed: true,
            status_code: None,
            reason: None,
        }
    }

    /// Create a denying decision
    pub fn deny(status_code: u16, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            status_code: Some(status_code),
            reason: Some(reason.into()),
        }
    }
}
