//! Complete engine state
//!
//! [`ChainState`] aggregates every table the engine writes. It is a
//! plain value: actions receive it by exclusive reference, and a clone
//! taken before an action is the rollback point if the action fails.

use crate::asset::Symbol;
use crate::bandwidth::BandwidthLedger;
use crate::fund::{FundLedger, RexBalance};
use crate::loans::LoanBook;
use crate::orders::OrderQueue;
use crate::pool::RexPool;
use crate::time::TimePoint;
use crate::types::{AccountName, LoanKind};
use crate::voting::{ProducerInfo, VoteWeight, VoterInfo};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All persisted tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    /// Core token symbol
    pub core: Symbol,

    /// Delegations, refunds and resource totals
    pub bandwidth: BandwidthLedger,

    /// REX pool singleton
    pub pool: RexPool,

    /// REX funds
    pub funds: FundLedger,

    /// REX balances by owner
    pub rex_balances: BTreeMap<AccountName, RexBalance>,

    /// CPU loans
    pub cpu_loans: LoanBook,

    /// NET loans
    pub net_loans: LoanBook,

    /// Queued sell orders
    pub orders: OrderQueue,

    /// Voters by owner
    pub voters: BTreeMap<AccountName, VoterInfo>,

    /// Producers by owner
    pub producers: BTreeMap<AccountName, ProducerInfo>,

    /// Sum of all producers' vote weight
    pub total_producer_vote_weight: VoteWeight,

    /// Time of the last committed action
    pub last_action_time: TimePoint,
}

impl ChainState {
    /// Empty state for `core`
    pub fn new(core: Symbol) -> Self {
        Self {
            core,
            bandwidth: BandwidthLedger::default(),
            pool: RexPool::new(core),
            funds: FundLedger::default(),
            rex_balances: BTreeMap::new(),
            cpu_loans: LoanBook::default(),
            net_loans: LoanBook::default(),
            orders: OrderQueue::default(),
            voters: BTreeMap::new(),
            producers: BTreeMap::new(),
            total_producer_vote_weight: 0,
            last_action_time: TimePoint::default(),
        }
    }

    /// Loan book for `kind`
    pub fn loans(&self, kind: LoanKind) -> &LoanBook {
        match kind {
            LoanKind::Cpu => &self.cpu_loans,
            LoanKind::Net => &self.net_loans,
        }
    }

    /// Mutable loan book for `kind`
    pub fn loans_mut(&mut self, kind: LoanKind) -> &mut LoanBook {
        match kind {
            LoanKind::Cpu => &mut self.cpu_loans,
            LoanKind::Net => &mut self.net_loans,
        }
    }

    /// Cross-table invariants that must hold between actions
    pub fn check_invariants(&self) -> Result<()> {
        self.pool.check_invariants()?;

        let mut total_rex = 0i64;
        for balance in self.rex_balances.values() {
            balance.check_invariants()?;
            total_rex += balance.rex_balance.amount;
        }
        if total_rex != self.pool.total_rex.amount {
            return Err(Error::inconsistent(format!(
                "balances hold {} REX, pool reports {}",
                total_rex, self.pool.total_rex.amount
            )));
        }

        self.cpu_loans.check_invariants()?;
        self.net_loans.check_invariants()?;
        let staked = self.cpu_loans.total_staked() + self.net_loans.total_staked();
        if staked != self.pool.total_lent.amount {
            return Err(Error::inconsistent(format!(
                "loans stake {}, pool lent {}",
                staked, self.pool.total_lent.amount
            )));
        }

        self.orders.check_invariants()?;
        for order in self.orders.iter() {
            let matured = self
                .rex_balances
                .get(&order.owner)
                .map(|b| b.matured_rex)
                .unwrap_or(0);
            if order.rex_requested.amount > matured {
                return Err(Error::inconsistent(format!(
                    "order of {} exceeds matured REX",
                    order.owner
                )));
            }
        }

        self.check_resource_totals()?;

        for voter in self.voters.values() {
            if voter.staked < 0 {
                return Err(Error::inconsistent(format!(
                    "voter {} has negative stake",
                    voter.owner
                )));
            }
        }

        let producer_votes = self
            .producers
            .values()
            .try_fold(0 as VoteWeight, |sum, p| sum.checked_add(p.total_votes))
            .ok_or_else(|| Error::ArithmeticOverflow("producer votes overflow".to_string()))?;
        if producer_votes != self.total_producer_vote_weight {
            return Err(Error::inconsistent(format!(
                "producers hold {} votes, total reports {}",
                producer_votes, self.total_producer_vote_weight
            )));
        }
        Ok(())
    }

    /// Receiver totals must equal delegations plus rented stake
    fn check_resource_totals(&self) -> Result<()> {
        let mut expected: BTreeMap<&AccountName, (i64, i64)> = BTreeMap::new();
        for d in self.bandwidth.delegations() {
            let entry = expected.entry(&d.receiver).or_default();
            entry.0 += d.net_weight.amount;
            entry.1 += d.cpu_weight.amount;
        }
        for loan in self.net_loans.iter() {
            expected.entry(&loan.receiver).or_default().0 += loan.total_staked.amount;
        }
        for loan in self.cpu_loans.iter() {
            expected.entry(&loan.receiver).or_default().1 += loan.total_staked.amount;
        }
        expected.retain(|_, totals| *totals != (0, 0));

        let mut recorded = 0;
        for totals in self.bandwidth.resource_totals() {
            recorded += 1;
            let want = expected.get(&totals.owner).copied().unwrap_or((0, 0));
            if want != (totals.net_weight.amount, totals.cpu_weight.amount) {
                return Err(Error::inconsistent(format!(
                    "resources of {} are {}/{}, backing is {}/{}",
                    totals.owner, totals.net_weight.amount, totals.cpu_weight.amount, want.0, want.1
                )));
            }
        }
        if recorded != expected.len() {
            return Err(Error::inconsistent("resource totals missing for a receiver"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;

    #[test]
    fn test_empty_state_is_consistent() {
        let state = ChainState::new(Symbol::new("CORE", 4).unwrap());
        state.check_invariants().unwrap();
        assert!(state.loans(LoanKind::Cpu).is_empty());
    }

    #[test]
    fn test_detects_unbacked_resources() {
        let core = Symbol::new("CORE", 4).unwrap();
        let mut state = ChainState::new(core);
        let alice = AccountName::new("alice");
        state
            .bandwidth
            .change_delegation(&alice, &alice, Asset::new(5, core), Asset::new(0, core), false)
            .unwrap();
        assert!(state.check_invariants().is_err());

        state
            .bandwidth
            .change_resources(&alice, Asset::new(5, core), Asset::new(0, core))
            .unwrap();
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_detects_vote_total_drift() {
        let mut state = ChainState::new(Symbol::new("CORE", 4).unwrap());
        let producer = AccountName::new("prod.a");
        state.producers.insert(
            producer.clone(),
            ProducerInfo {
                owner: producer,
                total_votes: 7,
                is_active: true,
            },
        );
        assert!(state.check_invariants().is_err());
        state.total_producer_vote_weight = 7;
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_detects_unbacked_rex() {
        let mut state = ChainState::new(Symbol::new("CORE", 4).unwrap());
        state.pool.total_rex.amount = 10;
        state.pool.total_lendable.amount = 10;
        state.pool.total_unlent.amount = 10;
        assert!(matches!(
            state.check_invariants(),
            Err(Error::StateInconsistency(_))
        ));
    }
}
