//! CPU and NET loans drawn from the REX pool

use super::ResourceSystem;
use crate::asset::Asset;
use crate::error::ensure;
use crate::host::Host;
use crate::loans::RexLoan;
use crate::types::{AccountName, LoanKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// What happened to an expired loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanOutcome {
    /// Rented again for another term
    Renewed,
    /// Unstaked; the remaining balance went back to the owner's fund
    Closed,
}

impl<H: Host> ResourceSystem<H> {
    /// Rent CPU for `receiver`; returns the loan number
    pub fn rent_cpu(
        &mut self,
        from: &AccountName,
        receiver: &AccountName,
        loan_payment: Asset,
        loan_fund: Asset,
    ) -> Result<u64> {
        self.rent(LoanKind::Cpu, from, receiver, loan_payment, loan_fund)
    }

    /// Rent NET for `receiver`; returns the loan number
    pub fn rent_net(
        &mut self,
        from: &AccountName,
        receiver: &AccountName,
        loan_payment: Asset,
        loan_fund: Asset,
    ) -> Result<u64> {
        self.rent(LoanKind::Net, from, receiver, loan_payment, loan_fund)
    }

    /// Add renewal funds to a CPU loan
    pub fn fund_cpu_loan(
        &mut self,
        from: &AccountName,
        loan_num: u64,
        payment: Asset,
    ) -> Result<()> {
        self.fund_loan(LoanKind::Cpu, from, loan_num, payment)
    }

    /// Add renewal funds to a NET loan
    pub fn fund_net_loan(
        &mut self,
        from: &AccountName,
        loan_num: u64,
        payment: Asset,
    ) -> Result<()> {
        self.fund_loan(LoanKind::Net, from, loan_num, payment)
    }

    /// Withdraw renewal funds from a CPU loan
    pub fn defund_cpu_loan(
        &mut self,
        from: &AccountName,
        loan_num: u64,
        amount: Asset,
    ) -> Result<()> {
        self.defund_loan(LoanKind::Cpu, from, loan_num, amount)
    }

    /// Withdraw renewal funds from a NET loan
    pub fn defund_net_loan(
        &mut self,
        from: &AccountName,
        loan_num: u64,
        amount: Asset,
    ) -> Result<()> {
        self.defund_loan(LoanKind::Net, from, loan_num, amount)
    }

    /// Rent `kind` for `receiver`, paying `loan_payment` for the first term
    /// and setting aside `loan_fund` for renewals
    pub fn rent(
        &mut self,
        kind: LoanKind,
        from: &AccountName,
        receiver: &AccountName,
        loan_payment: Asset,
        loan_fund: Asset,
    ) -> Result<u64> {
        self.transact("rent", |sys| {
            loan_payment.require_positive(sys.core, "loan payment")?;
            loan_fund.require_non_negative(sys.core, "loan fund")?;
            if !sys.rex_loans_available() {
                return Err(Error::InsufficientLiquidity(
                    "rex loans are currently not available".to_string(),
                ));
            }
            sys.state.funds.debit(from, loan_payment.checked_add(loan_fund)?)?;

            let rented = sys.state.pool.rent_quote(loan_payment.amount)?;
            ensure(
                rented > loan_payment.amount,
                "loan price does not favor renting",
            )?;
            let loan_num = sys
                .state
                .pool
                .add_loan(loan_payment.amount, rented, true)?
                .ok_or_else(|| Error::inconsistent("new loan without a number"))?;

            let expiration = sys.now().plus_days(sys.config.rex.loan_term_days);
            let total_staked = sys.core_asset(rented);
            sys.state.loans_mut(kind).insert(RexLoan {
                from: from.clone(),
                receiver: receiver.clone(),
                payment: loan_payment,
                balance: loan_fund,
                total_staked,
                loan_num,
                expiration,
            })?;
            let (net, cpu) = kind.split(rented);
            sys.update_resource_limits(receiver, net, cpu)?;
            info!(
                %kind, %from, %receiver, loan_num, payment = %loan_payment,
                staked = %total_staked, %expiration, "loan opened"
            );

            Ok(loan_num)
        })
    }

    /// Move `payment` from the owner's fund into the loan's balance
    pub fn fund_loan(
        &mut self,
        kind: LoanKind,
        from: &AccountName,
        loan_num: u64,
        payment: Asset,
    ) -> Result<()> {
        self.transact("fundloan", |sys| {
            payment.require_positive(sys.core, "loan funding")?;
            let mut loan = sys.owned_live_loan(kind, from, loan_num)?;
            sys.state.funds.debit(from, payment)?;
            loan.balance = loan.balance.checked_add(payment)?;
            sys.state.loans_mut(kind).update(loan)?;
            info!(%kind, %from, loan_num, %payment, "loan funded");
            Ok(())
        })
    }

    /// Move `amount` from the loan's balance back to the owner's fund
    pub fn defund_loan(
        &mut self,
        kind: LoanKind,
        from: &AccountName,
        loan_num: u64,
        amount: Asset,
    ) -> Result<()> {
        self.transact("defundloan", |sys| {
            amount.require_positive(sys.core, "loan defunding")?;
            let mut loan = sys.owned_live_loan(kind, from, loan_num)?;
            if amount.amount > loan.balance.amount {
                return Err(Error::InsufficientBalance(format!(
                    "insufficient loan balance: {} held, {} requested",
                    loan.balance, amount
                )));
            }
            // a loan set to renew keeps enough for the next payment
            let renews = loan.balance.amount >= loan.payment.amount;
            if renews && loan.balance.amount - amount.amount < loan.payment.amount {
                return Err(Error::InsufficientBalance(format!(
                    "loan balance must cover the renewal payment of {}",
                    loan.payment
                )));
            }
            loan.balance = loan.balance.checked_sub(amount)?;
            sys.state.loans_mut(kind).update(loan)?;
            sys.state.funds.credit(from, amount)?;
            info!(%kind, %from, loan_num, %amount, "loan defunded");
            Ok(())
        })
    }

    /// Renew or close an expired loan
    ///
    /// The staked tokens always return to the pool first. The loan then
    /// renews at the current price when its balance covers the payment,
    /// no sell orders are waiting and the price still favors renting.
    /// Otherwise it closes and its balance is refunded to the fund.
    pub(crate) fn process_expired_loan(
        &mut self,
        kind: LoanKind,
        loan_num: u64,
    ) -> Result<LoanOutcome> {
        let mut loan = self
            .state
            .loans(kind)
            .get(loan_num)
            .cloned()
            .ok_or_else(|| Error::inconsistent(format!("{} loan {} missing", kind, loan_num)))?;
        self.state.pool.remove_loan(loan.total_staked.amount)?;

        if loan.balance.amount >= loan.payment.amount && self.rex_loans_available() {
            let rented = self.state.pool.rent_quote(loan.payment.amount)?;
            if rented > loan.payment.amount {
                self.state.pool.add_loan(loan.payment.amount, rented, false)?;
                let delta = rented - loan.total_staked.amount;
                loan.balance = loan.balance.checked_sub(loan.payment)?;
                loan.total_staked = self.core_asset(rented);
                loan.expiration = loan.expiration.plus_days(self.config.rex.loan_term_days);
                let receiver = loan.receiver.clone();
                info!(
                    %kind, loan_num, staked = %loan.total_staked,
                    balance = %loan.balance, expiration = %loan.expiration, "loan renewed"
                );
                self.state.loans_mut(kind).update(loan)?;
                let (net, cpu) = kind.split(delta);
                self.update_resource_limits(&receiver, net, cpu)?;
                return Ok(LoanOutcome::Renewed);
            }
        }

        let (net, cpu) = kind.split(-loan.total_staked.amount);
        self.update_resource_limits(&loan.receiver, net, cpu)?;
        if loan.balance.amount > 0 {
            self.state.funds.credit(&loan.from, loan.balance)?;
        }
        self.state.loans_mut(kind).remove(loan_num);
        info!(%kind, loan_num, refunded = %loan.balance, "loan closed");
        Ok(LoanOutcome::Closed)
    }

    /// New loans and renewals are possible
    pub(crate) fn rex_loans_available(&self) -> bool {
        self.state.orders.is_empty() && self.state.pool.is_available()
    }

    /// Loan owned by `from`, evaluated first if its term has ended
    fn owned_live_loan(
        &mut self,
        kind: LoanKind,
        from: &AccountName,
        loan_num: u64,
    ) -> Result<RexLoan> {
        let now = self.now();
        let loan = self
            .state
            .loans(kind)
            .get(loan_num)
            .ok_or_else(|| Error::precondition("loan not found"))?;
        ensure(&loan.from == from, "user must be loan creator")?;
        if loan.is_expired(now)
            && self.process_expired_loan(kind, loan_num)? == LoanOutcome::Closed
        {
            return Err(Error::precondition("loan not found"));
        }
        self.state
            .loans(kind)
            .get(loan_num)
            .cloned()
            .ok_or_else(|| Error::precondition("loan not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::system::testkit::{acct, core, setup, setup_with, test_config, voter, DAY};

    fn pool_with_lender(sys: &mut ResourceSystem<MemoryHost>) -> AccountName {
        let lender = voter(sys, "lender", 1_000_0000);
        sys.deposit(&lender, core(1_000_0000)).unwrap();
        sys.buy_rex(&lender, core(1_000_0000)).unwrap();
        lender
    }

    #[test]
    fn test_rent_stakes_to_receiver() {
        let mut sys = setup();
        pool_with_lender(&mut sys);
        let renter = acct("renter");
        let bob = acct("bob");
        sys.host_mut().issue(&renter, 200_0000);
        sys.deposit(&renter, core(200_0000)).unwrap();

        let num = sys
            .rent_net(&renter, &bob, core(100_0000), core(50_0000))
            .unwrap();
        assert_eq!(num, 1);
        assert_eq!(sys.host().limits_of(&bob).net_weight, 200_0000);
        assert_eq!(sys.pool().total_unlent.amount, 900_0000);
        assert_eq!(sys.rex_fund(&renter).unwrap().balance.amount, 50_0000);

        let loan = sys.loan(LoanKind::Net, num).unwrap();
        assert_eq!(loan.balance.amount, 50_0000);
        assert_eq!(loan.total_staked.amount, 200_0000);
    }

    #[test]
    fn test_rent_needs_initialized_pool() {
        let mut sys = setup();
        let renter = acct("renter");
        sys.host_mut().issue(&renter, 10_0000);
        sys.deposit(&renter, core(10_0000)).unwrap();
        let err = sys
            .rent_cpu(&renter, &renter, core(1_0000), core(0))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientLiquidity(_)));
    }

    #[test]
    fn test_fund_and_defund() {
        let mut sys = setup();
        pool_with_lender(&mut sys);
        let renter = acct("renter");
        sys.host_mut().issue(&renter, 300_0000);
        sys.deposit(&renter, core(300_0000)).unwrap();
        let num = sys
            .rent_cpu(&renter, &renter, core(100_0000), core(0))
            .unwrap();

        sys.fund_cpu_loan(&renter, num, core(80_0000)).unwrap();
        sys.defund_cpu_loan(&renter, num, core(30_0000)).unwrap();
        assert_eq!(sys.loan(LoanKind::Cpu, num).unwrap().balance.amount, 50_0000);
        assert_eq!(sys.rex_fund(&renter).unwrap().balance.amount, 150_0000);

        let err = sys.defund_cpu_loan(&renter, num, core(50_0001)).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance(_)));

        let other = acct("other");
        let err = sys.fund_cpu_loan(&other, num, core(1)).unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
        let err = sys.fund_net_loan(&renter, num, core(1)).unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
    }

    #[test]
    fn test_defund_keeps_renewal_payment() {
        let mut sys = setup();
        pool_with_lender(&mut sys);
        let renter = acct("renter");
        sys.host_mut().issue(&renter, 300_0000);
        sys.deposit(&renter, core(300_0000)).unwrap();
        let num = sys
            .rent_cpu(&renter, &renter, core(100_0000), core(150_0000))
            .unwrap();

        sys.defund_cpu_loan(&renter, num, core(50_0000)).unwrap();
        assert_eq!(sys.loan(LoanKind::Cpu, num).unwrap().balance.amount, 100_0000);
        let err = sys.defund_cpu_loan(&renter, num, core(1)).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance(_)));
        assert_eq!(sys.loan(LoanKind::Cpu, num).unwrap().balance.amount, 100_0000);
        assert_eq!(sys.rex_fund(&renter).unwrap().balance.amount, 100_0000);
    }

    #[test]
    fn test_funding_expired_unfunded_loan_fails() {
        let mut config = test_config();
        config.rex.housekeeping_batch = 0;
        let mut sys = setup_with(config);
        pool_with_lender(&mut sys);
        let renter = acct("renter");
        sys.host_mut().issue(&renter, 200_0000);
        sys.deposit(&renter, core(200_0000)).unwrap();
        let num = sys
            .rent_cpu(&renter, &renter, core(100_0000), core(10_0000))
            .unwrap();

        sys.host_mut().advance_secs(31 * DAY);
        let err = sys.fund_cpu_loan(&renter, num, core(1_0000)).unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
        // rolled back: the loan is still there until housekeeping closes it
        assert!(sys.loan(LoanKind::Cpu, num).is_some());
    }
}
