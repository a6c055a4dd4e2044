//! PayGrid Types - Canonical domain types for the pay-per-query agent marketplace
//!
//! This crate contains all foundational types for PayGrid with zero dependencies
//! on other paygrid crates. It defines the type system for:
//!
//! - Identity types (EscrowId, AgentId, TransferId, chain addresses)
//! - Escrow records and the escrow status lifecycle
//! - Agent registry records
//! - Cross-ledger balance snapshots and rebalance cycle records
//! - Seller policy records
//!
//! # Ledger ownership
//!
//! The on-chain escrow ledger is the sole source of truth for escrow state;
//! these types are point-in-time reads, never authoritative local copies.

pub mod agent;
pub mod balance;
pub mod error;
pub mod escrow;
pub mod identity;
pub mod policy;

pub use agent::*;
pub use balance::*;
pub use error::*;
pub use escrow::*;
pub use identity::*;
pub use policy::*;

/// Version of the PayGrid types schema
pub const TYPES_VERSION: &str = "0.1.0";
