//! REX loan ledger
//!
//! One [`LoanBook`] per resource kind. Loans are keyed by their number
//! and additionally indexed by `(expiration, loan_num)` so housekeeping
//! can scan the earliest-expiring loans without touching the rest.

use crate::asset::Asset;
use crate::time::TimePoint;
use crate::types::AccountName;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Time-boxed bandwidth rental drawn from the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RexLoan {
    /// Account paying for the loan
    pub from: AccountName,

    /// Account receiving the bandwidth
    pub receiver: AccountName,

    /// Fee paid for the current term
    pub payment: Asset,

    /// Prepaid funds available for renewals
    pub balance: Asset,

    /// Tokens staked to the receiver
    pub total_staked: Asset,

    /// Unique, never reused
    pub loan_num: u64,

    /// End of the current term
    pub expiration: TimePoint,
}

impl RexLoan {
    /// Term has ended at `now`
    pub fn is_expired(&self, now: TimePoint) -> bool {
        self.expiration <= now
    }
}

/// Loans of one resource kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoanBook {
    loans: BTreeMap<u64, RexLoan>,
    by_expiration: BTreeSet<(TimePoint, u64)>,
}

impl LoanBook {
    /// Loan by number
    pub fn get(&self, loan_num: u64) -> Option<&RexLoan> {
        self.loans.get(&loan_num)
    }

    /// Add a new loan
    pub fn insert(&mut self, loan: RexLoan) -> Result<()> {
        if self.loans.contains_key(&loan.loan_num) {
            return Err(Error::inconsistent(format!(
                "loan number {} already in use",
                loan.loan_num
            )));
        }
        self.by_expiration.insert((loan.expiration, loan.loan_num));
        self.loans.insert(loan.loan_num, loan);
        Ok(())
    }

    /// Replace an existing loan, re-indexing its expiration
    pub fn update(&mut self, loan: RexLoan) -> Result<()> {
        let old = self
            .loans
            .get(&loan.loan_num)
            .ok_or_else(|| Error::inconsistent(format!("loan {} missing", loan.loan_num)))?;
        self.by_expiration.remove(&(old.expiration, old.loan_num));
        self.by_expiration.insert((loan.expiration, loan.loan_num));
        self.loans.insert(loan.loan_num, loan);
        Ok(())
    }

    /// Delete a loan
    pub fn remove(&mut self, loan_num: u64) -> Option<RexLoan> {
        let loan = self.loans.remove(&loan_num)?;
        self.by_expiration.remove(&(loan.expiration, loan_num));
        Some(loan)
    }

    /// Earliest loan whose term has ended at `now`
    pub fn earliest_expired(&self, now: TimePoint) -> Option<(TimePoint, u64)> {
        self.by_expiration
            .iter()
            .next()
            .copied()
            .filter(|(expiration, _)| *expiration <= now)
    }

    /// Loans paid for by `owner`
    pub fn by_owner<'a>(&'a self, owner: &'a AccountName) -> impl Iterator<Item = &'a RexLoan> + 'a {
        self.loans.values().filter(move |l| &l.from == owner)
    }

    /// Loans in number order
    pub fn iter(&self) -> impl Iterator<Item = &RexLoan> {
        self.loans.values()
    }

    /// Open loans
    pub fn len(&self) -> usize {
        self.loans.len()
    }

    /// No open loans
    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    /// Sum of tokens staked by all loans
    pub fn total_staked(&self) -> i64 {
        self.loans.values().map(|l| l.total_staked.amount).sum()
    }

    /// Index and amounts are consistent
    pub fn check_invariants(&self) -> Result<()> {
        if self.by_expiration.len() != self.loans.len() {
            return Err(Error::inconsistent("loan expiration index out of sync"));
        }
        for loan in self.loans.values() {
            if !self.by_expiration.contains(&(loan.expiration, loan.loan_num)) {
                return Err(Error::inconsistent(format!(
                    "loan {} missing from expiration index",
                    loan.loan_num
                )));
            }
            if loan.balance.amount < 0 || loan.total_staked.amount <= 0 {
                return Err(Error::inconsistent(format!(
                    "loan {} has balance {} and stake {}",
                    loan.loan_num, loan.balance, loan.total_staked
                )));
            }
        }
        Ok(())
    }
}
