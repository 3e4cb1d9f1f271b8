//! Bandwidth delegation ledger
//!
//! Tracks who staked how much NET and CPU to whom, the per-receiver
//! totals that drive resource limits, and the single pending refund
//! each owner may have while unstaked tokens wait out the refund delay.

use crate::asset::{Asset, Symbol};
use crate::time::TimePoint;
use crate::types::AccountName;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stake delegated from one account to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedBandwidth {
    /// Account whose tokens are staked
    pub from: AccountName,

    /// Account receiving the resources
    pub receiver: AccountName,

    /// Staked for network bandwidth
    pub net_weight: Asset,

    /// Staked for CPU time
    pub cpu_weight: Asset,

    /// Stake was gifted to the receiver
    pub transferable: bool,
}

impl DelegatedBandwidth {
    /// Both weights are zero
    pub fn is_empty(&self) -> bool {
        self.net_weight.amount == 0 && self.cpu_weight.amount == 0
    }
}

/// Unstaked tokens waiting for the refund delay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Beneficiary
    pub owner: AccountName,

    /// Start of the delay; reset by every unstake
    pub request_time: TimePoint,

    /// Net portion
    pub net_amount: Asset,

    /// Cpu portion
    pub cpu_amount: Asset,
}

impl RefundRequest {
    /// Claimable at `now`
    pub fn is_due(&self, now: TimePoint, delay_secs: i64) -> bool {
        self.request_time.plus_secs(delay_secs) <= now
    }

    /// Nothing left to refund
    pub fn is_empty(&self) -> bool {
        self.net_amount.amount == 0 && self.cpu_amount.amount == 0
    }

    /// Net plus cpu
    pub fn total(&self) -> Result<Asset> {
        self.net_amount.checked_add(self.cpu_amount)
    }
}

/// Resources credited to a receiver (delegations plus loans)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResources {
    /// Receiver
    pub owner: AccountName,
    /// Total net stake
    pub net_weight: Asset,
    /// Total cpu stake
    pub cpu_weight: Asset,
}

/// Delegations, refunds and resource totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BandwidthLedger {
    delegations: BTreeMap<(AccountName, AccountName), DelegatedBandwidth>,
    refunds: BTreeMap<AccountName, RefundRequest>,
    resources: BTreeMap<AccountName, UserResources>,
}

impl BandwidthLedger {
    /// Delegation record
    pub fn delegation(&self, from: &AccountName, receiver: &AccountName) -> Option<&DelegatedBandwidth> {
        self.delegations.get(&(from.clone(), receiver.clone()))
    }

    /// Net plus cpu the owner has staked to itself
    pub fn self_stake(&self, owner: &AccountName) -> i64 {
        self.delegation(owner, owner)
            .map(|d| d.net_weight.amount + d.cpu_weight.amount)
            .unwrap_or(0)
    }

    /// Apply signed deltas to the `(from, receiver)` record
    ///
    /// The record is created on first stake and deleted once both
    /// weights reach zero. Going below zero fails with `InvalidAmount`.
    pub fn change_delegation(
        &mut self,
        from: &AccountName,
        receiver: &AccountName,
        net: Asset,
        cpu: Asset,
        transferable: bool,
    ) -> Result<()> {
        let key = (from.clone(), receiver.clone());
        let mut record = match self.delegations.get(&key) {
            Some(existing) => existing.clone(),
            None => DelegatedBandwidth {
                from: from.clone(),
                receiver: receiver.clone(),
                net_weight: Asset::zero(net.symbol),
                cpu_weight: Asset::zero(cpu.symbol),
                transferable,
            },
        };
        record.net_weight = record.net_weight.checked_add(net)?;
        record.cpu_weight = record.cpu_weight.checked_add(cpu)?;
        if record.net_weight.amount < 0 {
            return Err(Error::invalid("insufficient staked net bandwidth"));
        }
        if record.cpu_weight.amount < 0 {
            return Err(Error::invalid("insufficient staked cpu bandwidth"));
        }
        if record.is_empty() {
            self.delegations.remove(&key);
        } else {
            self.delegations.insert(key, record);
        }
        Ok(())
    }

    /// Apply signed deltas to the receiver's totals
    pub fn change_resources(
        &mut self,
        receiver: &AccountName,
        net: Asset,
        cpu: Asset,
    ) -> Result<UserResources> {
        let mut totals = self
            .resources
            .get(receiver)
            .cloned()
            .unwrap_or_else(|| UserResources {
                owner: receiver.clone(),
                net_weight: Asset::zero(net.symbol),
                cpu_weight: Asset::zero(cpu.symbol),
            });
        totals.net_weight = totals.net_weight.checked_add(net)?;
        totals.cpu_weight = totals.cpu_weight.checked_add(cpu)?;
        if totals.net_weight.amount < 0 || totals.cpu_weight.amount < 0 {
            return Err(Error::inconsistent(format!(
                "resource totals of {} went negative",
                receiver
            )));
        }
        if totals.net_weight.amount == 0 && totals.cpu_weight.amount == 0 {
            self.resources.remove(receiver);
        } else {
            self.resources.insert(receiver.clone(), totals.clone());
        }
        Ok(totals)
    }

    /// Resource totals of `receiver`
    pub fn resources(&self, receiver: &AccountName) -> Option<&UserResources> {
        self.resources.get(receiver)
    }

    /// All receivers' resource totals in key order
    pub fn resource_totals(&self) -> impl Iterator<Item = &UserResources> {
        self.resources.values()
    }

    /// Pending refund of `owner`
    pub fn refund(&self, owner: &AccountName) -> Option<&RefundRequest> {
        self.refunds.get(owner)
    }

    /// Fold a stake change into the owner's pending refund
    ///
    /// Negative deltas (unstaking) grow the refund and restart its
    /// timer. Positive deltas (self-staking) are served from the refund
    /// first. Returns the `(net, cpu)` amounts still to be transferred
    /// in from the owner's liquid balance.
    pub fn settle_refund(
        &mut self,
        owner: &AccountName,
        net_delta: i64,
        cpu_delta: i64,
        core: Symbol,
        now: TimePoint,
    ) -> Result<(i64, i64)> {
        let mut net_balance = net_delta;
        let mut cpu_balance = cpu_delta;
        let unstaking = net_delta < 0 || cpu_delta < 0;

        match self.refunds.get(owner).cloned() {
            Some(mut req) => {
                if unstaking {
                    req.request_time = now;
                }
                req.net_amount.amount -= net_balance;
                if req.net_amount.amount < 0 {
                    net_balance = -req.net_amount.amount;
                    req.net_amount.amount = 0;
                } else {
                    net_balance = 0;
                }
                req.cpu_amount.amount -= cpu_balance;
                if req.cpu_amount.amount < 0 {
                    cpu_balance = -req.cpu_amount.amount;
                    req.cpu_amount.amount = 0;
                } else {
                    cpu_balance = 0;
                }
                if req.is_empty() {
                    self.refunds.remove(owner);
                } else {
                    self.refunds.insert(owner.clone(), req);
                }
            }
            None if unstaking => {
                self.refunds.insert(
                    owner.clone(),
                    RefundRequest {
                        owner: owner.clone(),
                        request_time: now,
                        net_amount: Asset::new(-net_balance.min(0), core),
                        cpu_amount: Asset::new(-cpu_balance.min(0), core),
                    },
                );
                net_balance = net_balance.max(0);
                cpu_balance = cpu_balance.max(0);
            }
            None => {}
        }
        Ok((net_balance, cpu_balance))
    }

    /// Remove and return the owner's refund
    pub fn take_refund(&mut self, owner: &AccountName) -> Option<RefundRequest> {
        self.refunds.remove(owner)
    }

    /// All delegations in key order
    pub fn delegations(&self) -> impl Iterator<Item = &DelegatedBandwidth> {
        self.delegations.values()
    }

    /// Net plus cpu staked across all delegations
    pub fn total_staked(&self) -> i64 {
        self.delegations
            .values()
            .map(|d| d.net_weight.amount + d.cpu_weight.amount)
            .sum()
    }

    /// Sum of all pending refunds
    pub fn total_refunding(&self) -> i64 {
        self.refunds
            .values()
            .map(|r| r.net_amount.amount + r.cpu_amount.amount)
            .sum()
    }
}
