//! Identity types for PayGrid
//!
//! On-chain entities are addressed by integer indexes assigned by their
//! contracts; off-chain entities (custodial transfers) carry provider-issued
//! string ids. All are strongly typed to prevent accidental mixing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate index-based ID types with common implementations
macro_rules! define_index_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            /// Get the raw index
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(index: u64) -> Self {
                Self(index)
            }
        }
    };
}

define_index_id!(EscrowId, "Escrow index on the escrow ledger; existence is implied by index < escrow_count()");
define_index_id!(AgentId, "Agent index on the agent registry; zero is the no-provider sentinel");

impl AgentId {
    /// The registry returns agent id 0 when no active provider matches.
    pub const SENTINEL: AgentId = AgentId(0);

    /// Whether this is the no-provider sentinel
    pub fn is_sentinel(&self) -> bool {
        self.0 == 0
    }
}

/// Macro to generate opaque string ID types
macro_rules! define_string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_string_id!(ChainAddress, "An externally-owned account or contract address");
define_string_id!(TxHash, "An on-chain transaction hash");
define_string_id!(TransferId, "A custodial wallet provider transfer id");
define_string_id!(TaskHash, "Content-derived task identifier binding an escrow to one task");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_agent_id() {
        assert!(AgentId::SENTINEL.is_sentinel());
        assert!(AgentId(0).is_sentinel());
        assert!(!AgentId(5).is_sentinel());
    }

    #[test]
    fn escrow_id_ordering_follows_index() {
        assert!(EscrowId(3) < EscrowId(7));
        assert_eq!(EscrowId::from(7).as_u64(), 7);
    }

    #[test]
    fn string_ids_roundtrip() {
        let hash = TxHash::new("0xabc123");
        assert_eq!(hash.as_str(), "0xabc123");
        assert_eq!(hash.to_string(), "0xabc123");
    }
}
