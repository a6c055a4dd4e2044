//! PayGrid Ledger - Typed adapters for the three money ledgers
//!
//! Pure I/O adapters with no policy: the custodial wallet provider, the
//! intermediate on-chain account, the payment facility gateway, and the
//! escrow/registry contracts. Policy (thresholds, state transitions,
//! admission) lives in the crates above this one.
//!
//! Contract calls use a small fixed set of strongly-typed call structs, one
//! per method actually used, instead of string-keyed function dispatch.
//!
//! In-memory implementations of every trait double as test fixtures and
//! local-run backends.

pub mod chain;
pub mod custodial;
pub mod escrow_ledger;
pub mod facility;
pub mod poll;
pub mod registry;
pub mod store;

pub use chain::*;
pub use custodial::*;
pub use escrow_ledger::*;
pub use facility::*;
pub use poll::*;
pub use registry::*;
pub use store::*;
