//! Bandwidth staking, unstaking and refund claims

use super::ResourceSystem;
use crate::asset::Asset;
use crate::error::ensure;
use crate::host::Host;
use crate::types::AccountName;
use crate::{Error, Result};
use tracing::info;

impl<H: Host> ResourceSystem<H> {
    /// Stake `net` and `cpu` from `from` to `receiver`
    ///
    /// With `transfer` set the stake is gifted: the record belongs to the
    /// receiver and so does its voting power.
    pub fn delegate_bandwidth(
        &mut self,
        from: &AccountName,
        receiver: &AccountName,
        net: Asset,
        cpu: Asset,
        transfer: bool,
    ) -> Result<()> {
        self.transact("delegatebw", |sys| {
            net.require_non_negative(sys.core, "stake_net_quantity")?;
            cpu.require_non_negative(sys.core, "stake_cpu_quantity")?;
            if net.amount + cpu.amount <= 0 {
                return Err(Error::invalid("must stake a positive amount"));
            }
            if transfer && from == receiver {
                return Err(Error::precondition("cannot use transfer flag if delegating to self"));
            }
            sys.change_bandwidth(from, receiver, net.amount, cpu.amount, transfer)?;
            info!(%from, %receiver, %net, %cpu, transfer, "bandwidth delegated");
            Ok(())
        })
    }

    /// Unstake `net` and `cpu` previously staked from `from` to `receiver`
    ///
    /// Tokens join the owner's pending refund and can be claimed with
    /// [`refund`](Self::refund) once the refund delay has passed.
    pub fn undelegate_bandwidth(
        &mut self,
        from: &AccountName,
        receiver: &AccountName,
        net: Asset,
        cpu: Asset,
    ) -> Result<()> {
        self.transact("undelegatebw", |sys| {
            net.require_non_negative(sys.core, "unstake_net_quantity")?;
            cpu.require_non_negative(sys.core, "unstake_cpu_quantity")?;
            if net.amount + cpu.amount <= 0 {
                return Err(Error::invalid("must unstake a positive amount"));
            }
            sys.change_bandwidth(from, receiver, -net.amount, -cpu.amount, false)?;
            info!(%from, %receiver, %net, %cpu, "bandwidth undelegated");
            Ok(())
        })
    }

    /// Pay out the owner's pending refund once the delay has passed
    pub fn refund(&mut self, owner: &AccountName) -> Result<()> {
        self.transact("refund", |sys| {
            let now = sys.now();
            let delay = sys.config.bandwidth.refund_delay_secs;
            let request = sys
                .state
                .bandwidth
                .refund(owner)
                .cloned()
                .ok_or_else(|| Error::precondition("refund request not found"))?;
            ensure(request.is_due(now, delay), "refund is not available yet")?;

            sys.state.bandwidth.take_refund(owner);
            let total = request.total()?;
            let stake_account = sys.config.accounts.stake.clone();
            sys.host.transfer(&stake_account, owner, total, "unstake")?;
            info!(%owner, amount = %total, "refund claimed");
            Ok(())
        })
    }

    /// Apply signed stake deltas, settle tokens and refresh voting power
    pub(crate) fn change_bandwidth(
        &mut self,
        from: &AccountName,
        receiver: &AccountName,
        net_delta: i64,
        cpu_delta: i64,
        transfer: bool,
    ) -> Result<()> {
        if (net_delta < 0 && cpu_delta > 0) || (net_delta > 0 && cpu_delta < 0) {
            return Err(Error::invalid("net and cpu deltas cannot be opposite signs"));
        }
        let source = from;
        let from = if transfer { receiver } else { from };

        let is_new_record = self.state.bandwidth.delegation(from, receiver).is_none();
        let min_self_stake = self.config.bandwidth.min_self_stake;
        if is_new_record && from != receiver && net_delta + cpu_delta > 0 && min_self_stake > 0 {
            ensure(
                self.state.bandwidth.self_stake(source) >= min_self_stake,
                "must self-stake the minimum before delegating to another account",
            )?;
        }

        let (net, cpu) = (self.core_asset(net_delta), self.core_asset(cpu_delta));
        self.state
            .bandwidth
            .change_delegation(from, receiver, net, cpu, transfer)?;
        self.update_resource_limits(receiver, net_delta, cpu_delta)?;

        let unstaking = net_delta + cpu_delta < 0;
        let self_stake = !transfer && from == receiver;
        let (net_owed, cpu_owed) = if unstaking || self_stake {
            let now = self.now();
            self.state
                .bandwidth
                .settle_refund(from, net_delta, cpu_delta, self.core, now)?
        } else {
            (net_delta, cpu_delta)
        };
        let owed = net_owed + cpu_owed;
        if owed > 0 {
            let stake_account = self.config.accounts.stake.clone();
            let amount = self.core_asset(owed);
            self.host
                .transfer(source, &stake_account, amount, "stake bandwidth")?;
        }

        self.run_vote_stake_hooks(from)?;
        self.update_voting_power(from, net_delta + cpu_delta)
    }
}
