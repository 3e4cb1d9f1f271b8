//! Host ledger interfaces
//!
//! The engine does not own token balances, resource limits or the
//! clock. It reaches them through [`Host`]. [`MemoryHost`] is a
//! self-contained implementation for tests and the node binary.

use crate::asset::{Asset, Symbol};
use crate::time::TimePoint;
use crate::types::AccountName;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Services provided by the surrounding ledger runtime
///
/// Implementations are cloned before every action so a failed action can
/// be rolled back together with the engine state.
pub trait Host: Clone {
    /// Current block time; must never decrease
    fn now(&self) -> TimePoint;

    /// Move liquid tokens; fails with `InsufficientBalance`
    fn transfer(
        &mut self,
        from: &AccountName,
        to: &AccountName,
        amount: Asset,
        memo: &str,
    ) -> Result<()>;

    /// Set the bandwidth an account may consume
    fn set_resource_limits(
        &mut self,
        account: &AccountName,
        net_weight: i64,
        cpu_weight: i64,
    ) -> Result<()>;
}

/// Bandwidth limits last set for an account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Net weight
    pub net_weight: i64,
    /// Cpu weight
    pub cpu_weight: i64,
}

/// In-memory token ledger, limit table and settable clock
#[derive(Debug, Clone)]
pub struct MemoryHost {
    symbol: Symbol,
    clock: TimePoint,
    balances: BTreeMap<AccountName, i64>,
    limits: BTreeMap<AccountName, ResourceLimits>,
}

impl MemoryHost {
    /// Create new host at `start`
    pub fn new(symbol: Symbol, start: TimePoint) -> Self {
        Self {
            symbol,
            clock: start,
            balances: BTreeMap::new(),
            limits: BTreeMap::new(),
        }
    }

    /// Mint liquid tokens to `account`
    pub fn issue(&mut self, account: &AccountName, amount: i64) {
        *self.balances.entry(account.clone()).or_insert(0) += amount;
    }

    /// Liquid balance
    pub fn balance_of(&self, account: &AccountName) -> i64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Limits last set for `account`
    pub fn limits_of(&self, account: &AccountName) -> ResourceLimits {
        self.limits.get(account).copied().unwrap_or_default()
    }

    /// Move the clock forward
    pub fn advance_secs(&mut self, secs: i64) {
        self.clock = self.clock.plus_secs(secs);
    }

    /// Move the clock forward by whole days
    pub fn advance_days(&mut self, days: i64) {
        self.clock = self.clock.plus_days(days);
    }

    /// Set the clock; the engine rejects actions if it goes backwards
    pub fn set_time(&mut self, now: TimePoint) {
        self.clock = now;
    }
}

impl Host for MemoryHost {
    fn now(&self) -> TimePoint {
        self.clock
    }

    fn transfer(
        &mut self,
        from: &AccountName,
        to: &AccountName,
        amount: Asset,
        memo: &str,
    ) -> Result<()> {
        if amount.symbol != self.symbol {
            return Err(Error::invalid(format!(
                "cannot transfer {}; host token is {}",
                amount, self.symbol
            )));
        }
        if amount.amount <= 0 {
            return Err(Error::invalid(format!("transfer amount must be positive: {}", amount)));
        }
        let available = self.balance_of(from);
        if available < amount.amount {
            return Err(Error::InsufficientBalance(format!(
                "{} holds {} base units, needs {} ({})",
                from, available, amount.amount, memo
            )));
        }
        *self.balances.entry(from.clone()).or_insert(0) -= amount.amount;
        *self.balances.entry(to.clone()).or_insert(0) += amount.amount;
        tracing::trace!(%from, %to, %amount, memo, "transfer");
        Ok(())
    }

    fn set_resource_limits(
        &mut self,
        account: &AccountName,
        net_weight: i64,
        cpu_weight: i64,
    ) -> Result<()> {
        self.limits.insert(
            account.clone(),
            ResourceLimits {
                net_weight,
                cpu_weight,
            },
        );
        Ok(())
    }
}
