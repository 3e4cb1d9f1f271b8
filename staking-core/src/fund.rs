//! REX fund and balance ledgers
//!
//! The fund is a per-owner holding area: deposits and withdrawals move
//! tokens between the owner's liquid balance and the fund, while REX
//! purchases, sales and loan settlements move tokens between the fund
//! and the pool.
//!
//! A [`RexBalance`] tracks the owner's shares, the core value counted in
//! their vote (`vote_stake`) and the maturity schedule. It keeps
//! `matured_rex + Σ buckets == rex_balance` at all times.

use crate::asset::{add_i64, sub_i64, Asset, Symbol, REX_SYMBOL};
use crate::maturity::{self, MaturityBucket};
use crate::time::TimePoint;
use crate::types::AccountName;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Per-owner REX fund
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RexFund {
    /// Fund owner
    pub owner: AccountName,
    /// Core tokens held
    pub balance: Asset,
}

/// All REX funds keyed by owner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundLedger {
    funds: BTreeMap<AccountName, RexFund>,
}

impl FundLedger {
    /// Fund record
    pub fn get(&self, owner: &AccountName) -> Option<&RexFund> {
        self.funds.get(owner)
    }

    /// Fund balance in base units (zero when absent)
    pub fn balance_of(&self, owner: &AccountName) -> i64 {
        self.funds.get(owner).map(|f| f.balance.amount).unwrap_or(0)
    }

    /// Add tokens, creating the fund on first use
    pub fn credit(&mut self, owner: &AccountName, amount: Asset) -> Result<()> {
        let fund = self.funds.entry(owner.clone()).or_insert_with(|| RexFund {
            owner: owner.clone(),
            balance: Asset::zero(amount.symbol),
        });
        fund.balance = fund.balance.checked_add(amount)?;
        Ok(())
    }

    /// Remove tokens; fails when the fund is short
    pub fn debit(&mut self, owner: &AccountName, amount: Asset) -> Result<()> {
        let fund = self
            .funds
            .get_mut(owner)
            .ok_or_else(|| Error::InsufficientBalance(format!("{} has no REX fund", owner)))?;
        if fund.balance.amount < amount.amount {
            return Err(Error::InsufficientBalance(format!(
                "fund of {} holds {}, needs {}",
                owner, fund.balance, amount
            )));
        }
        fund.balance = fund.balance.checked_sub(amount)?;
        Ok(())
    }

    /// Delete a fund record
    pub fn remove(&mut self, owner: &AccountName) -> Option<RexFund> {
        self.funds.remove(owner)
    }

    /// Sum of all fund balances
    pub fn total(&self) -> i64 {
        self.funds.values().map(|f| f.balance.amount).sum()
    }
}

/// Per-owner REX holdings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RexBalance {
    /// Holder
    pub owner: AccountName,

    /// Core value currently counted in the owner's vote
    pub vote_stake: Asset,

    /// REX shares held
    pub rex_balance: Asset,

    /// Shares free to sell
    pub matured_rex: i64,

    /// Pending buckets in due order, savings last
    pub rex_maturities: VecDeque<MaturityBucket>,
}

impl RexBalance {
    /// Empty balance
    pub fn new(owner: AccountName, core: Symbol) -> Self {
        Self {
            owner,
            vote_stake: Asset::zero(core),
            rex_balance: Asset::zero(REX_SYMBOL),
            matured_rex: 0,
            rex_maturities: VecDeque::new(),
        }
    }

    /// Fold buckets due at `now` into `matured_rex`
    pub fn process_maturities(&mut self, now: TimePoint) -> Result<()> {
        let (matured, remaining) = maturity::consolidate(&self.rex_maturities, now);
        self.matured_rex = add_i64(self.matured_rex, matured, "matured_rex")?;
        self.rex_maturities = remaining;
        Ok(())
    }

    /// REX parked in savings
    pub fn savings(&self) -> i64 {
        match self.rex_maturities.back() {
            Some(b) if b.due == TimePoint::MAX => b.amount,
            _ => 0,
        }
    }

    /// Credit freshly bought shares, maturing at `due`
    pub fn add_shares(&mut self, rex: i64, due: TimePoint, now: TimePoint) -> Result<()> {
        self.rex_balance.amount = add_i64(self.rex_balance.amount, rex, "rex_balance")?;
        let savings = maturity::take_savings(&mut self.rex_maturities);
        self.process_maturities(now)?;
        maturity::schedule(&mut self.rex_maturities, due, rex);
        maturity::put_savings(&mut self.rex_maturities, savings);
        Ok(())
    }

    /// Merge every non-savings bucket and all matured REX not backing
    /// the open sell order into one bucket due at `due`
    pub fn consolidate_all(
        &mut self,
        rex_in_sell_order: i64,
        due: TimePoint,
        now: TimePoint,
    ) -> Result<()> {
        let savings = maturity::take_savings(&mut self.rex_maturities);
        self.process_maturities(now)?;
        let mut merged = sub_i64(self.matured_rex, rex_in_sell_order, "matured_rex")?;
        self.matured_rex = rex_in_sell_order;
        merged += maturity::total(&self.rex_maturities);
        self.rex_maturities.clear();
        if merged > 0 {
            self.rex_maturities.push_back(MaturityBucket { due, amount: merged });
        }
        maturity::put_savings(&mut self.rex_maturities, savings);
        Ok(())
    }

    /// Lock `rex` into savings, drawing on the latest-maturing buckets
    /// first and matured REX last
    pub fn move_to_savings(&mut self, rex: i64, rex_in_sell_order: i64, now: TimePoint) -> Result<()> {
        let savings = self.savings();
        let required = rex
            .checked_add(rex_in_sell_order)
            .and_then(|r| r.checked_add(savings))
            .ok_or_else(|| Error::ArithmeticOverflow("savings request".to_string()))?;
        if required > self.rex_balance.amount {
            return Err(Error::InsufficientBalance(format!(
                "insufficient REX balance: {} requested, {} in savings, {} in sell order, {} held",
                rex, savings, rex_in_sell_order, self.rex_balance.amount
            )));
        }

        let savings = maturity::take_savings(&mut self.rex_maturities);
        self.process_maturities(now)?;
        let mut moved = 0i64;
        while moved < rex {
            let Some(last) = self.rex_maturities.back_mut() else {
                break;
            };
            let take = (rex - moved).min(last.amount);
            last.amount -= take;
            moved += take;
            if last.amount == 0 {
                self.rex_maturities.pop_back();
            }
        }
        if moved < rex {
            self.matured_rex -= rex - moved;
            if self.matured_rex < rex_in_sell_order {
                return Err(Error::inconsistent("savings move consumed REX backing a sell order"));
            }
        }
        maturity::put_savings(&mut self.rex_maturities, savings + rex);
        Ok(())
    }

    /// Release `rex` from savings into a bucket due at `due`
    pub fn move_from_savings(&mut self, rex: i64, due: TimePoint, now: TimePoint) -> Result<()> {
        let savings = maturity::take_savings(&mut self.rex_maturities);
        if rex > savings {
            maturity::put_savings(&mut self.rex_maturities, savings);
            return Err(Error::InsufficientBalance(format!(
                "insufficient REX in savings: {} requested, {} saved",
                rex, savings
            )));
        }
        self.process_maturities(now)?;
        maturity::schedule(&mut self.rex_maturities, due, rex);
        maturity::put_savings(&mut self.rex_maturities, savings - rex);
        Ok(())
    }

    /// Remove `rex` sold shares from the matured amount
    pub fn remove_sold(&mut self, rex: i64) -> Result<()> {
        if rex > self.matured_rex {
            return Err(Error::inconsistent(format!(
                "selling {} REX with only {} matured",
                rex, self.matured_rex
            )));
        }
        self.rex_balance.amount -= rex;
        self.matured_rex -= rex;
        Ok(())
    }

    /// Check `matured_rex + Σ buckets == rex_balance`
    pub fn check_invariants(&self) -> Result<()> {
        let scheduled = maturity::total(&self.rex_maturities);
        if self.matured_rex < 0 || self.matured_rex + scheduled != self.rex_balance.amount {
            return Err(Error::inconsistent(format!(
                "REX balance of {}: matured {} + scheduled {} != {}",
                self.owner, self.matured_rex, scheduled, self.rex_balance.amount
            )));
        }
        Ok(())
    }
}
