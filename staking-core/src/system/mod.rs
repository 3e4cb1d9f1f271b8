//! Resource staking and exchange engine
//!
//! [`ResourceSystem`] owns the [`ChainState`] and a [`Host`]. Every
//! public action runs through [`ResourceSystem::transact`], which
//!
//! 1. rejects a clock that moved backwards,
//! 2. spends a small housekeeping budget on expired loans and queued
//!    sell orders,
//! 3. runs the action body,
//! 4. re-checks every cross-table invariant,
//!
//! and restores the previous state and host if any step fails.
//!
//! Action bodies live in submodules by area: [`delegation`],
//! [`exchange`], [`rental`], [`housekeeping`] and [`votes`].

pub mod delegation;
pub mod exchange;
pub mod housekeeping;
pub mod rental;
pub mod votes;

#[cfg(test)]
pub(crate) mod testkit;

pub use exchange::SellOutcome;
pub use housekeeping::HousekeepingReport;

use crate::asset::{add_i64, sub_i64, Asset, Symbol};
use crate::config::Config;
use crate::fund::{RexBalance, RexFund};
use crate::host::Host;
use crate::loans::RexLoan;
use crate::pool::{PoolParams, RexPool};
use crate::state::ChainState;
use crate::time::TimePoint;
use crate::types::{AccountName, LoanKind};
use crate::voting::{DoublingSchedule, ProducerInfo, VoteWeightSchedule, VoterInfo};
use crate::{Error, Result};
use tracing::{info_span, warn};

/// Handler run before a voter's weight is recomputed
pub type VoteStakeHook = fn(&mut ChainState, &AccountName) -> Result<()>;

/// Refresh the owner's REX vote stake to the current share value
///
/// Only the voter's `staked` is adjusted here; the caller propagates
/// the resulting weight change.
pub fn refresh_rex_vote_stake(state: &mut ChainState, owner: &AccountName) -> Result<()> {
    let Some(balance) = state.rex_balances.get(owner) else {
        return Ok(());
    };
    if !state.voters.contains_key(owner) {
        return Ok(());
    }
    let current = state.pool.share_value(balance.rex_balance.amount)?;
    let delta = sub_i64(current, balance.vote_stake.amount, "vote stake")?;
    if delta == 0 {
        return Ok(());
    }
    if let Some(balance) = state.rex_balances.get_mut(owner) {
        balance.vote_stake.amount = current;
    }
    if let Some(voter) = state.voters.get_mut(owner) {
        voter.staked = add_i64(voter.staked, delta, "voter stake")?;
    }
    Ok(())
}

/// Staking, REX and vote-weight engine over a host ledger
pub struct ResourceSystem<H: Host> {
    config: Config,
    core: Symbol,
    state: ChainState,
    host: H,
    schedule: Box<dyn VoteWeightSchedule>,
    vote_stake_hooks: Vec<VoteStakeHook>,
}

impl<H: Host> std::fmt::Debug for ResourceSystem<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSystem")
            .field("core", &self.core)
            .field("last_action_time", &self.state.last_action_time)
            .finish_non_exhaustive()
    }
}

impl<H: Host> ResourceSystem<H> {
    /// Create new engine with empty state
    pub fn new(config: Config, host: H) -> Result<Self> {
        config.validate()?;
        let core = config.core_symbol()?;
        Self::with_state(config, host, ChainState::new(core))
    }

    /// Resume from a previously saved state
    pub fn with_state(config: Config, host: H, state: ChainState) -> Result<Self> {
        config.validate()?;
        let core = config.core_symbol()?;
        if state.core != core {
            return Err(Error::Config(format!(
                "state uses {}, configuration expects {}",
                state.core, core
            )));
        }
        state.check_invariants()?;
        let schedule = DoublingSchedule {
            epoch: TimePoint::from_secs(config.voting.epoch_secs),
            doubling_weeks: config.voting.doubling_weeks,
        };
        Ok(Self {
            config,
            core,
            state,
            host,
            schedule: Box::new(schedule),
            vote_stake_hooks: vec![refresh_rex_vote_stake],
        })
    }

    /// Replace the vote weight schedule
    pub fn with_schedule(mut self, schedule: impl VoteWeightSchedule + 'static) -> Self {
        self.schedule = Box::new(schedule);
        self
    }

    /// Append a handler to the vote-stake hook list
    pub fn add_vote_stake_hook(&mut self, hook: VoteStakeHook) {
        self.vote_stake_hooks.push(hook);
    }

    /// Engine configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Core token symbol
    pub fn core_symbol(&self) -> Symbol {
        self.core
    }

    /// Current state
    pub fn state(&self) -> &ChainState {
        &self.state
    }

    /// Host ledger
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable host ledger (clock control, funding in tests)
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Split into state and host
    pub fn into_parts(self) -> (ChainState, H) {
        (self.state, self.host)
    }

    /// REX pool
    pub fn pool(&self) -> &RexPool {
        &self.state.pool
    }

    /// REX fund of `owner`
    pub fn rex_fund(&self, owner: &AccountName) -> Option<&RexFund> {
        self.state.funds.get(owner)
    }

    /// REX balance of `owner`
    pub fn rex_balance(&self, owner: &AccountName) -> Option<&RexBalance> {
        self.state.rex_balances.get(owner)
    }

    /// Loan by kind and number
    pub fn loan(&self, kind: LoanKind, loan_num: u64) -> Option<&RexLoan> {
        self.state.loans(kind).get(loan_num)
    }

    /// Voter record
    pub fn voter(&self, owner: &AccountName) -> Option<&VoterInfo> {
        self.state.voters.get(owner)
    }

    /// Producer record
    pub fn producer(&self, owner: &AccountName) -> Option<&ProducerInfo> {
        self.state.producers.get(owner)
    }

    /// Run `body` as one atomic action
    ///
    /// The rollback copy is a full clone of the state and host, so the
    /// cost of an action grows with the number of accounts.
    pub fn transact<T>(
        &mut self,
        action: &'static str,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let span = info_span!("action", action);
        let _enter = span.enter();

        let now = self.host.now();
        if now < self.state.last_action_time {
            let err = Error::inconsistent(format!(
                "clock moved backwards: {} < {}",
                now, self.state.last_action_time
            ));
            warn!(code = err.code(), error = %err, "action rejected");
            return Err(err);
        }

        let state_backup = self.state.clone();
        let host_backup = self.host.clone();
        match self.run_action(body) {
            Ok(value) => {
                self.state.last_action_time = now;
                Ok(value)
            }
            Err(err) => {
                warn!(code = err.code(), error = %err, "action rejected");
                self.state = state_backup;
                self.host = host_backup;
                Err(err)
            }
        }
    }

    fn run_action<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let batch = self.config.rex.housekeeping_batch;
        self.run_housekeeping(batch)?;
        let value = body(self)?;
        self.state.check_invariants()?;
        Ok(value)
    }

    pub(crate) fn now(&self) -> TimePoint {
        self.host.now()
    }

    pub(crate) fn pool_params(&self) -> PoolParams {
        PoolParams {
            min_seed_amount: self.config.rex.min_seed_amount,
            initial_rent_connector: self.config.rex.initial_rent_connector,
        }
    }

    pub(crate) fn core_asset(&self, amount: i64) -> Asset {
        Asset::new(amount, self.core)
    }

    /// Apply `(net, cpu)` to the receiver's totals and push them to the host
    pub(crate) fn update_resource_limits(
        &mut self,
        receiver: &AccountName,
        net_delta: i64,
        cpu_delta: i64,
    ) -> Result<()> {
        let (net, cpu) = (self.core_asset(net_delta), self.core_asset(cpu_delta));
        let totals = self.state.bandwidth.change_resources(receiver, net, cpu)?;
        self.host.set_resource_limits(
            receiver,
            totals.net_weight.amount,
            totals.cpu_weight.amount,
        )
    }

    /// Run every vote-stake hook for `owner` in registration order
    pub(crate) fn run_vote_stake_hooks(&mut self, owner: &AccountName) -> Result<()> {
        for hook in &self.vote_stake_hooks {
            hook(&mut self.state, owner)?;
        }
        Ok(())
    }
}
