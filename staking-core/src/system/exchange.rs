//! REX fund, purchase, sale and balance management

use super::ResourceSystem;
use crate::asset::{Asset, REX_SYMBOL};
use crate::error::ensure;
use crate::fund::RexBalance;
use crate::host::Host;
use crate::maturity::maturity_date;
use crate::orders::RexOrder;
use crate::time::TimePoint;
use crate::types::AccountName;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Result of a sell request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellOutcome {
    /// Sold immediately; proceeds credited to the REX fund
    Filled {
        /// Core tokens received
        proceeds: Asset,
        /// Change of the seller's vote stake
        stake_change: Asset,
    },
    /// Not enough unlent tokens; the order waits in the queue
    Queued {
        /// Shares reserved for the order
        rex_requested: Asset,
    },
}

/// Proceeds and vote stake change of one filled sale
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fill {
    pub(crate) proceeds: i64,
    pub(crate) stake_change: i64,
}

impl<H: Host> ResourceSystem<H> {
    /// Move liquid tokens into the owner's REX fund
    pub fn deposit(&mut self, owner: &AccountName, amount: Asset) -> Result<()> {
        self.transact("deposit", |sys| {
            amount.require_positive(sys.core, "deposit quantity")?;
            let rex_account = sys.config.accounts.rex.clone();
            sys.host
                .transfer(owner, &rex_account, amount, "deposit to REX fund")?;
            sys.state.funds.credit(owner, amount)?;
            info!(%owner, %amount, "deposit");
            Ok(())
        })
    }

    /// Move tokens from the owner's REX fund back to their liquid balance
    pub fn withdraw(&mut self, owner: &AccountName, amount: Asset) -> Result<()> {
        self.transact("withdraw", |sys| {
            amount.require_positive(sys.core, "withdrawal quantity")?;
            sys.state.funds.debit(owner, amount)?;
            let rex_account = sys.config.accounts.rex.clone();
            sys.host
                .transfer(&rex_account, owner, amount, "withdraw from REX fund")?;
            info!(%owner, %amount, "withdraw");
            Ok(())
        })
    }

    /// Buy REX with tokens from the owner's fund
    ///
    /// Returns the shares received. They mature after `maturity_days`.
    pub fn buy_rex(&mut self, from: &AccountName, amount: Asset) -> Result<Asset> {
        self.transact("buyrex", |sys| {
            amount.require_positive(sys.core, "REX purchase")?;
            sys.check_voting_requirement(from)?;
            sys.state.funds.debit(from, amount)?;

            let params = sys.pool_params();
            let minted = sys.state.pool.buy(amount.amount, &params)?;
            let delta = sys.add_to_rex_balance(from, amount.amount, minted)?;
            sys.update_voting_power(from, delta)?;
            info!(%from, %amount, rex = minted, "REX bought");

            let cap = sys.config.rex.max_housekeeping_batch;
            sys.process_sell_queue(cap)?;
            Ok(Asset::new(minted, REX_SYMBOL))
        })
    }

    /// Convert tokens staked from `owner` to `receiver` directly into REX
    ///
    /// The tokens skip the refund delay; the vote stake carries over.
    pub fn unstake_to_rex(
        &mut self,
        owner: &AccountName,
        receiver: &AccountName,
        from_net: Asset,
        from_cpu: Asset,
    ) -> Result<Asset> {
        self.transact("unstaketorex", |sys| {
            from_net.require_non_negative(sys.core, "from_net")?;
            from_cpu.require_non_negative(sys.core, "from_cpu")?;
            let payment = from_net.checked_add(from_cpu)?;
            if payment.amount <= 0 {
                return Err(Error::invalid("must unstake a positive amount to buy REX"));
            }
            sys.check_voting_requirement(owner)?;

            let record = sys
                .state
                .bandwidth
                .delegation(owner, receiver)
                .ok_or_else(|| Error::precondition("delegated bandwidth record does not exist"))?;
            if from_net.amount > record.net_weight.amount {
                return Err(Error::InsufficientBalance(
                    "amount exceeds tokens staked for net".to_string(),
                ));
            }
            if from_cpu.amount > record.cpu_weight.amount {
                return Err(Error::InsufficientBalance(
                    "amount exceeds tokens staked for cpu".to_string(),
                ));
            }
            sys.state
                .bandwidth
                .change_delegation(owner, receiver, from_net.neg(), from_cpu.neg(), false)?;
            sys.update_resource_limits(receiver, -from_net.amount, -from_cpu.amount)?;

            let stake_account = sys.config.accounts.stake.clone();
            let rex_account = sys.config.accounts.rex.clone();
            sys.host.transfer(
                &stake_account,
                &rex_account,
                payment,
                "buy REX with staked tokens",
            )?;

            let params = sys.pool_params();
            let minted = sys.state.pool.buy(payment.amount, &params)?;
            let delta = sys.add_to_rex_balance(owner, payment.amount, minted)?;
            sys.update_voting_power(owner, delta - payment.amount)?;
            info!(%owner, %receiver, %payment, rex = minted, "stake converted to REX");

            let cap = sys.config.rex.max_housekeeping_batch;
            sys.process_sell_queue(cap)?;
            Ok(Asset::new(minted, REX_SYMBOL))
        })
    }

    /// Sell matured REX
    ///
    /// Fills immediately when the pool has enough unlent tokens, otherwise
    /// queues the order. Only one order per owner may be open.
    pub fn sell_rex(&mut self, from: &AccountName, rex: Asset) -> Result<SellOutcome> {
        self.transact("sellrex", |sys| {
            rex.require_positive(REX_SYMBOL, "REX sale")?;
            ensure(
                sys.state.rex_balances.contains_key(from),
                "user must first buyrex",
            )?;
            ensure(
                sys.state.orders.get(from).is_none(),
                "an open sell order already exists",
            )?;

            let now = sys.now();
            let matured = {
                let balance = sys.rex_balance_mut(from)?;
                balance.process_maturities(now)?;
                balance.matured_rex
            };
            if rex.amount > matured {
                return Err(Error::InsufficientBalance(format!(
                    "insufficient available rex: {} matured, {} requested",
                    matured, rex.amount
                )));
            }

            let quote = sys.state.pool.quote_sale(rex.amount)?;
            if quote.proceeds == 0 {
                return Err(Error::invalid("proceeds are negligible"));
            }
            if !quote.fillable {
                sys.state
                    .orders
                    .push(RexOrder::open(from.clone(), rex, now))?;
                info!(%from, %rex, "sell order queued");
                return Ok(SellOutcome::Queued { rex_requested: rex });
            }

            let fill = sys.fill_rex_order(from, rex.amount)?;
            let proceeds = sys.core_asset(fill.proceeds);
            sys.state.funds.credit(from, proceeds)?;
            sys.update_voting_power(from, fill.stake_change)?;
            info!(%from, %rex, %proceeds, "REX sold");
            Ok(SellOutcome::Filled {
                proceeds,
                stake_change: sys.core_asset(fill.stake_change),
            })
        })
    }

    /// Withdraw the owner's queued sell order
    pub fn cancel_rex_order(&mut self, owner: &AccountName) -> Result<()> {
        self.transact("cnclrexorder", |sys| {
            sys.state
                .orders
                .remove(owner)
                .ok_or_else(|| Error::precondition("no sellrex order is scheduled"))?;
            info!(%owner, "sell order cancelled");
            Ok(())
        })
    }

    /// Revalue the owner's REX vote stake at the current share price
    pub fn update_rex(&mut self, owner: &AccountName) -> Result<()> {
        self.transact("updaterex", |sys| {
            let now = sys.now();
            let (rex_balance, init) = {
                let balance = sys.rex_balance_mut(owner)?;
                balance.process_maturities(now)?;
                (balance.rex_balance.amount, balance.vote_stake.amount)
            };
            let current = sys.state.pool.share_value(rex_balance)?;
            sys.rex_balance_mut(owner)?.vote_stake.amount = current;
            sys.update_voting_power(owner, current - init)?;
            debug!(%owner, vote_stake = current, "REX vote stake updated");
            Ok(())
        })
    }

    /// Merge all pending and matured REX (except what backs an open
    /// order) into one bucket maturing at the current maturity date
    pub fn consolidate(&mut self, owner: &AccountName) -> Result<()> {
        self.transact("consolidate", |sys| {
            let now = sys.now();
            let due = sys.rex_maturity(now);
            let in_order = sys.state.orders.rex_in_order(owner);
            sys.rex_balance_mut(owner)?
                .consolidate_all(in_order, due, now)?;
            info!(%owner, due = %due, "REX consolidated");
            Ok(())
        })
    }

    /// Lock REX into the savings bucket
    pub fn move_to_savings(&mut self, owner: &AccountName, rex: Asset) -> Result<()> {
        self.transact("mvtosavings", |sys| {
            rex.require_positive(REX_SYMBOL, "savings amount")?;
            let now = sys.now();
            let in_order = sys.state.orders.rex_in_order(owner);
            sys.rex_balance_mut(owner)?
                .move_to_savings(rex.amount, in_order, now)?;
            info!(%owner, %rex, "REX moved to savings");
            Ok(())
        })
    }

    /// Release REX from savings into the normal maturity schedule
    pub fn move_from_savings(&mut self, owner: &AccountName, rex: Asset) -> Result<()> {
        self.transact("mvfrsavings", |sys| {
            rex.require_positive(REX_SYMBOL, "savings amount")?;
            let now = sys.now();
            let due = sys.rex_maturity(now);
            sys.rex_balance_mut(owner)?
                .move_from_savings(rex.amount, due, now)?;
            info!(%owner, %rex, "REX moved from savings");
            Ok(())
        })
    }

    /// Delete the owner's empty fund and REX balance records
    pub fn close_rex(&mut self, owner: &AccountName) -> Result<()> {
        self.transact("closerex", |sys| {
            ensure(
                sys.state.cpu_loans.by_owner(owner).next().is_none(),
                "account has outstanding CPU loans",
            )?;
            ensure(
                sys.state.net_loans.by_owner(owner).next().is_none(),
                "account has outstanding NET loans",
            )?;
            if let Some(fund) = sys.state.funds.get(owner) {
                ensure(
                    fund.balance.amount == 0,
                    "account has remaining REX fund balance",
                )?;
                sys.state.funds.remove(owner);
            }
            if let Some(balance) = sys.state.rex_balances.get(owner) {
                ensure(
                    balance.rex_balance.amount == 0,
                    "account has remaining REX balance, must sell first",
                )?;
                ensure(
                    sys.state.orders.get(owner).is_none(),
                    "account has an open sell order",
                )?;
                sys.state.rex_balances.remove(owner);
            }
            info!(%owner, "REX records closed");
            Ok(())
        })
    }

    /// Feed fee income from `from` into the pool without minting shares
    ///
    /// Skipped while the pool holds no shares.
    pub fn channel_to_rex(&mut self, from: &AccountName, amount: Asset) -> Result<()> {
        self.transact("channeltorex", |sys| {
            amount.require_positive(sys.core, "channelled amount")?;
            if !sys.state.pool.is_available() {
                debug!(%from, %amount, "REX pool not initialized; income not channelled");
                return Ok(());
            }
            let rex_account = sys.config.accounts.rex.clone();
            sys.host
                .transfer(from, &rex_account, amount, "transfer to REX pool")?;
            sys.state.pool.add_income(amount.amount)?;
            info!(%from, %amount, "income channelled to REX pool");
            let cap = sys.config.rex.max_housekeeping_batch;
            sys.process_sell_queue(cap)?;
            Ok(())
        })
    }

    /// Move name auction proceeds into the pool's pending inflow
    ///
    /// The proceeds reach share holders at the next housekeeping pass.
    pub fn channel_namebid_to_rex(&mut self, amount: Asset) -> Result<()> {
        self.transact("channelnamebid", |sys| {
            amount.require_positive(sys.core, "name bid proceeds")?;
            if !sys.state.pool.is_available() {
                debug!(%amount, "REX pool not initialized; name bid proceeds not channelled");
                return Ok(());
            }
            let names = sys.config.accounts.names.clone();
            let rex_account = sys.config.accounts.rex.clone();
            sys.host.transfer(
                &names,
                &rex_account,
                amount,
                "transfer from name auction to REX pool",
            )?;
            sys.state.pool.add_namebid_proceeds(amount.amount)?;
            info!(%amount, "name bid proceeds queued for REX pool");
            Ok(())
        })
    }

    pub(crate) fn check_voting_requirement(&self, owner: &AccountName) -> Result<()> {
        let min = self.config.rex.min_producers_voted;
        let voted = self
            .state
            .voters
            .get(owner)
            .map(|v| v.proxy.is_some() || v.producers.len() >= min)
            .unwrap_or(false);
        ensure(
            voted,
            &format!(
                "must vote for at least {} producers or for a proxy before buying REX",
                min
            ),
        )
    }

    pub(crate) fn rex_maturity(&self, now: TimePoint) -> TimePoint {
        maturity_date(now, self.config.rex.maturity_days)
    }

    pub(crate) fn rex_balance_mut(&mut self, owner: &AccountName) -> Result<&mut RexBalance> {
        self.state
            .rex_balances
            .get_mut(owner)
            .ok_or_else(|| Error::precondition(format!("{} has no REX balance", owner)))
    }

    /// Credit `rex_received` shares bought for `payment`; returns the
    /// change of the owner's vote stake
    fn add_to_rex_balance(
        &mut self,
        owner: &AccountName,
        payment: i64,
        rex_received: i64,
    ) -> Result<i64> {
        let now = self.now();
        let due = self.rex_maturity(now);
        let core = self.core;
        let pool = &self.state.pool;
        match self.state.rex_balances.get_mut(owner) {
            None => {
                let mut balance = RexBalance::new(owner.clone(), core);
                balance.vote_stake.amount = payment;
                balance.add_shares(rex_received, due, now)?;
                self.state.rex_balances.insert(owner.clone(), balance);
                Ok(payment)
            }
            Some(balance) => {
                let init = balance.vote_stake.amount;
                balance.add_shares(rex_received, due, now)?;
                balance.vote_stake.amount = pool.share_value(balance.rex_balance.amount)?;
                Ok(balance.vote_stake.amount - init)
            }
        }
    }

    /// Sell `rex` matured shares of `owner` against the pool
    pub(crate) fn fill_rex_order(&mut self, owner: &AccountName, rex: i64) -> Result<Fill> {
        let holding = self
            .state
            .rex_balances
            .get(owner)
            .map(|b| b.rex_balance.amount)
            .ok_or_else(|| Error::inconsistent(format!("{} has no REX balance", owner)))?;
        let current_value = self.state.pool.share_value(holding)?;
        let proceeds = self.state.pool.sell(rex)?;

        let balance = self.rex_balance_mut(owner)?;
        let init = balance.vote_stake.amount;
        balance.vote_stake.amount = current_value - proceeds;
        balance.remove_sold(rex)?;
        Ok(Fill {
            proceeds,
            stake_change: balance.vote_stake.amount - init,
        })
    }
}
