//! Resource staking and REX engine
//!
//! Bandwidth delegation, a share-priced resource exchange (REX) that
//! rents staked tokens out as CPU and NET loans, and a vote tally that
//! follows every stake change.
//!
//! # Architecture
//!
//! - **Atomic actions**: every operation commits completely or not at all
//! - **Single Writer**: one actor task owns the engine state
//! - **Host seam**: token transfers, resource limits and the clock come
//!   from a [`Host`] implementation
//! - **Lazy housekeeping**: expired loans and queued sales are processed
//!   in small batches at the start of each action
//!
//! # Invariants
//!
//! - Pool identity: `total_lendable == total_lent + total_unlent`
//! - Share accounting: Σ(REX balances) == `total_rex`
//! - Loan accounting: Σ(loan stake) == `total_lent`
//! - Vote deltas: producer totals move by exactly the weight change

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod asset;
pub mod bandwidth;
pub mod config;
pub mod error;
pub mod fund;
pub mod host;
pub mod loans;
pub mod maturity;
pub mod metrics;
pub mod orders;
pub mod pool;
pub mod snapshot;
pub mod state;
pub mod system;
pub mod time;
pub mod types;
pub mod voting;

// Re-exports
pub use actor::{spawn_system_actor, Action, ActionReceipt, SystemHandle};
pub use asset::{Asset, Symbol, REX_SYMBOL};
pub use config::Config;
pub use error::{Error, Result};
pub use host::{Host, MemoryHost};
pub use metrics::Metrics;
pub use state::ChainState;
pub use system::{HousekeepingReport, ResourceSystem, SellOutcome};
pub use time::TimePoint;
pub use types::{AccountName, LoanKind};
pub use voting::{DoublingSchedule, FlatSchedule, VoteWeight, VoteWeightSchedule};
