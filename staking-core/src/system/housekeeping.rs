//! Bounded processing of expired loans and queued sell orders

use super::rental::LoanOutcome;
use super::ResourceSystem;
use crate::host::Host;
use crate::types::{AccountName, LoanKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Work done by one housekeeping pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousekeepingReport {
    /// Name auction proceeds folded into the pool
    pub namebid_settled: i64,
    /// Loans renewed
    pub loans_renewed: u32,
    /// Loans closed
    pub loans_closed: u32,
    /// Sell orders filled
    pub orders_filled: u32,
}

impl<H: Host> ResourceSystem<H> {
    /// Process up to `max` expired loans and `max` queued orders
    ///
    /// `user` only identifies who paid for the work.
    pub fn rex_exec(&mut self, user: &AccountName, max: u16) -> Result<HousekeepingReport> {
        let cap = self.config.rex.max_housekeeping_batch;
        if max == 0 || max > cap {
            return Err(Error::precondition(format!(
                "housekeeping batch must be between 1 and {}, got {}",
                cap, max
            )));
        }
        self.transact("rexexec", |sys| {
            let report = sys.run_housekeeping(max)?;
            info!(%user, ?report, "housekeeping");
            Ok(report)
        })
    }

    /// Settle name bid proceeds, then renew or close expired loans
    /// (earliest expiration first, CPU and NET combined), then walk the
    /// sell queue
    pub(crate) fn run_housekeeping(&mut self, max: u16) -> Result<HousekeepingReport> {
        let mut report = HousekeepingReport::default();
        if max == 0 {
            return Ok(report);
        }
        report.namebid_settled = self.state.pool.settle_namebid_proceeds()?;

        let now = self.now();
        for _ in 0..max {
            let cpu = self.state.cpu_loans.earliest_expired(now);
            let net = self.state.net_loans.earliest_expired(now);
            let (kind, loan_num) = match (cpu, net) {
                (Some(c), Some(n)) if n < c => (LoanKind::Net, n.1),
                (Some(c), _) => (LoanKind::Cpu, c.1),
                (None, Some(n)) => (LoanKind::Net, n.1),
                (None, None) => break,
            };
            match self.process_expired_loan(kind, loan_num)? {
                LoanOutcome::Renewed => report.loans_renewed += 1,
                LoanOutcome::Closed => report.loans_closed += 1,
            }
        }

        report.orders_filled = self.process_sell_queue(max)?;
        if report != HousekeepingReport::default() {
            debug!(?report, "housekeeping pass");
        }
        Ok(report)
    }

    /// Fill queued orders in time order until one cannot be filled
    ///
    /// Filled orders are removed; proceeds go to the owner's fund and
    /// the stake change to their voting power. Returns the number filled.
    pub(crate) fn process_sell_queue(&mut self, max: u16) -> Result<u32> {
        let mut filled = 0u32;
        while filled < u32::from(max) {
            let Some(order) = self.state.orders.front().cloned() else {
                break;
            };
            let quote = self.state.pool.quote_sale(order.rex_requested.amount)?;
            if !quote.fillable {
                break;
            }
            let fill = self.fill_rex_order(&order.owner, order.rex_requested.amount)?;
            self.state.orders.remove(&order.owner);
            let proceeds = self.core_asset(fill.proceeds);
            self.state.funds.credit(&order.owner, proceeds)?;
            self.update_voting_power(&order.owner, fill.stake_change)?;
            info!(
                owner = %order.owner, rex = %order.rex_requested, %proceeds,
                queued_at = %order.order_time, "sell order filled"
            );
            filled += 1;
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::testkit::{acct, core, rex, setup, voter, DAY};
    use crate::system::SellOutcome;

    #[test]
    fn test_rex_exec_bounds() {
        let mut sys = setup();
        let alice = acct("alice");
        assert!(matches!(
            sys.rex_exec(&alice, 0),
            Err(Error::PreconditionFailed(_))
        ));
        assert!(sys.rex_exec(&alice, 101).is_err());
        assert_eq!(
            sys.rex_exec(&alice, 100).unwrap(),
            HousekeepingReport::default()
        );
    }

    #[test]
    fn test_expired_loans_processed_in_expiration_order() {
        let mut sys = setup();
        let lender = voter(&mut sys, "lender", 1_000_0000);
        sys.deposit(&lender, core(1_000_0000)).unwrap();
        sys.buy_rex(&lender, core(1_000_0000)).unwrap();

        let renter = acct("renter");
        sys.host_mut().issue(&renter, 100_0000);
        sys.deposit(&renter, core(100_0000)).unwrap();
        let net = sys.rent_net(&renter, &renter, core(10_0000), core(0)).unwrap();
        sys.host_mut().advance_secs(DAY);
        let cpu = sys.rent_cpu(&renter, &renter, core(10_0000), core(0)).unwrap();

        sys.host_mut().advance_secs(30 * DAY);
        // the implicit budget of the action closes both loans
        let report = sys.rex_exec(&renter, 1).unwrap();
        assert_eq!(report, HousekeepingReport::default());
        assert!(sys.loan(LoanKind::Net, net).is_none());
        assert!(sys.loan(LoanKind::Cpu, cpu).is_none());
        assert_eq!(sys.pool().total_lent.amount, 0);
    }

    #[test]
    fn test_namebid_proceeds_settle_on_next_action() {
        let mut sys = setup();
        let lender = voter(&mut sys, "lender", 100_0000);
        sys.deposit(&lender, core(100_0000)).unwrap();
        sys.buy_rex(&lender, core(100_0000)).unwrap();

        let names = sys.config().accounts.names.clone();
        sys.host_mut().issue(&names, 20_0000);
        sys.channel_namebid_to_rex(core(20_0000)).unwrap();
        assert_eq!(sys.pool().namebid_proceeds.amount, 20_0000);
        assert_eq!(sys.pool().total_lendable.amount, 100_0000);

        sys.update_rex(&lender).unwrap();
        assert_eq!(sys.pool().namebid_proceeds.amount, 0);
        assert_eq!(sys.pool().total_lendable.amount, 120_0000);
        assert_eq!(sys.rex_balance(&lender).unwrap().vote_stake.amount, 120_0000);
    }

    #[test]
    fn test_queued_order_fills_when_loan_closes() {
        let mut sys = setup();
        let big = voter(&mut sys, "big", 1_000_0000);
        let small = voter(&mut sys, "small", 10_0000);
        sys.deposit(&big, core(1_000_0000)).unwrap();
        sys.buy_rex(&big, core(1_000_0000)).unwrap();
        sys.deposit(&small, core(10_0000)).unwrap();
        sys.buy_rex(&small, core(10_0000)).unwrap();

        let renter = acct("renter");
        sys.host_mut().issue(&renter, 300_0000);
        sys.deposit(&renter, core(300_0000)).unwrap();
        // 300 rents 1010 * 300 / 700 = 432.8571, leaving 877.1429 unlent
        sys.rent_cpu(&renter, &renter, core(300_0000), core(0)).unwrap();
        sys.host_mut().advance_secs(5 * DAY);

        let queued = sys.sell_rex(&big, rex(1_000_0000)).unwrap();
        assert!(matches!(queued, SellOutcome::Queued { .. }));
        let err = sys
            .rent_cpu(&renter, &renter, core(1_0000), core(0))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientLiquidity(_)));

        // a small sale that fits fills at once
        let small_sale = sys.sell_rex(&small, rex(10_0000)).unwrap();
        assert!(matches!(small_sale, SellOutcome::Filled { .. }));
        assert!(sys.state().orders.get(&big).is_some());

        sys.host_mut().advance_secs(30 * DAY);
        sys.rex_exec(&renter, 10).unwrap();
        assert!(sys.state().orders.is_empty());
        assert_eq!(sys.pool().total_lent.amount, 0);
        assert!(sys.rex_fund(&big).unwrap().balance.amount > 1_290_0000);
        assert_eq!(sys.rex_balance(&big).unwrap().rex_balance.amount, 0);
    }
}
