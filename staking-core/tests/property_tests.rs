//! Property-based tests for pool and engine invariants
//!
//! - Pool conservation: lendable == lent + unlent after any sequence
//! - Round trip: buying then selling never returns more than was paid
//! - Maturity: matured REX never shrinks as time advances
//! - Engine: arbitrary action sequences never break cross-table invariants

use proptest::prelude::*;
use staking_core::{
    fund::RexBalance,
    maturity::maturity_date,
    pool::{PoolParams, RexPool},
    AccountName, Asset, Config, FlatSchedule, MemoryHost, ResourceSystem, Symbol, TimePoint,
    REX_SYMBOL,
};

const DAY: i64 = 86_400;

fn core_symbol() -> Symbol {
    Symbol::new("CORE", 4).unwrap()
}

fn params() -> PoolParams {
    PoolParams {
        min_seed_amount: 1_0000,
        initial_rent_connector: 400_0000,
    }
}

/// Pool operation
#[derive(Debug, Clone)]
enum PoolOp {
    Buy(i64),
    SellFraction(u8),
    Rent(i64),
    Income(i64),
}

fn pool_op_strategy() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        (1_0000i64..1_000_000_0000).prop_map(PoolOp::Buy),
        (1u8..=100).prop_map(PoolOp::SellFraction),
        (1i64..100_0000).prop_map(PoolOp::Rent),
        (0i64..10_0000).prop_map(PoolOp::Income),
    ]
}

/// Engine action with small account and amount ranges
#[derive(Debug, Clone)]
enum EngineOp {
    Buy(usize, i64),
    Sell(usize, i64),
    Rent(usize, i64, i64),
    Unstake(usize, i64),
    Advance(i64),
    Exec(u16),
}

fn engine_op_strategy() -> impl Strategy<Value = EngineOp> {
    prop_oneof![
        (0usize..3, 1_0000i64..50_0000).prop_map(|(u, a)| EngineOp::Buy(u, a)),
        (0usize..3, 1i64..60_0000).prop_map(|(u, a)| EngineOp::Sell(u, a)),
        (0usize..3, 1i64..20_0000, 0i64..20_0000).prop_map(|(u, p, f)| EngineOp::Rent(u, p, f)),
        (0usize..3, 1i64..6000).prop_map(|(u, a)| EngineOp::Unstake(u, a)),
        (1i64..(10 * DAY)).prop_map(EngineOp::Advance),
        (1u16..10).prop_map(EngineOp::Exec),
    ]
}

fn engine() -> (ResourceSystem<MemoryHost>, Vec<AccountName>) {
    let mut config = Config::default();
    config.rex.min_producers_voted = 1;
    config.rex.initial_rent_connector = 400_0000;
    let host = MemoryHost::new(core_symbol(), TimePoint::from_secs(10 * DAY));
    let mut sys = ResourceSystem::new(config, host)
        .unwrap()
        .with_schedule(FlatSchedule);
    let producer = AccountName::new("prod.a");
    sys.register_producer(&producer).unwrap();

    let users: Vec<AccountName> = ["alice", "bob", "carol"]
        .iter()
        .map(|name| AccountName::new(*name))
        .collect();
    for user in &users {
        sys.host_mut().issue(user, 1_000_0000);
        let stake = Asset::new(5000, core_symbol());
        sys.delegate_bandwidth(user, user, stake, stake, false)
            .unwrap();
        sys.vote_producer(user, None, vec![producer.clone()])
            .unwrap();
        sys.deposit(user, Asset::new(900_0000, core_symbol()))
            .unwrap();
    }
    (sys, users)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: pool identity holds after any operation sequence
    #[test]
    fn prop_pool_conservation(ops in prop::collection::vec(pool_op_strategy(), 1..40)) {
        let mut pool = RexPool::new(core_symbol());
        pool.buy(1_000_0000, &params()).unwrap();

        for op in ops {
            let _ = match op {
                PoolOp::Buy(amount) => pool.buy(amount, &params()).map(|_| ()),
                PoolOp::SellFraction(pct) => {
                    let rex = pool.total_rex.amount * i64::from(pct) / 100;
                    if rex > 0 { pool.sell(rex).map(|_| ()) } else { Ok(()) }
                }
                PoolOp::Rent(payment) => pool
                    .rent_quote(payment)
                    .and_then(|rented| pool.add_loan(payment, rented, true))
                    .map(|_| ()),
                PoolOp::Income(amount) => pool.add_income(amount),
            };
            prop_assert!(pool.check_invariants().is_ok());
            prop_assert_eq!(
                pool.total_lendable.amount,
                pool.total_lent.amount + pool.total_unlent.amount
            );
            prop_assert!(pool.total_unlent.amount >= 0);
        }
    }

    /// Property: buying then immediately selling returns at most the payment
    #[test]
    fn prop_round_trip_never_profits(
        seed in 1_0000i64..1_000_000_0000,
        income in 0i64..1_000_0000,
        payment in 1_0000i64..1_000_000_0000,
    ) {
        let mut pool = RexPool::new(core_symbol());
        pool.buy(seed, &params()).unwrap();
        pool.add_income(income).unwrap();

        if let Ok(minted) = pool.buy(payment, &params()) {
            let proceeds = pool.sell(minted).unwrap();
            prop_assert!(proceeds <= payment);
        }
    }

    /// Property: matured REX is monotonic in time
    #[test]
    fn prop_matured_rex_monotonic(
        purchases in prop::collection::vec((0i64..(3 * DAY), 1i64..1_000_0000), 1..20),
        checks in prop::collection::vec(0i64..DAY, 1..20),
    ) {
        let mut balance = RexBalance::new(AccountName::new("alice"), core_symbol());
        let mut now = TimePoint::from_secs(100 * DAY);
        for (gap, rex) in purchases {
            now = now.plus_secs(gap);
            balance.add_shares(rex, maturity_date(now, 4), now).unwrap();
        }

        let mut last = balance.matured_rex;
        for gap in checks {
            now = now.plus_secs(gap);
            balance.process_maturities(now).unwrap();
            prop_assert!(balance.matured_rex >= last);
            prop_assert!(balance.matured_rex <= balance.rex_balance.amount);
            last = balance.matured_rex;
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: no action sequence leaves the engine inconsistent
    #[test]
    fn prop_engine_invariants(ops in prop::collection::vec(engine_op_strategy(), 1..30)) {
        let (mut sys, users) = engine();
        let core = |amount: i64| Asset::new(amount, core_symbol());

        for op in ops {
            let _ = match op {
                EngineOp::Buy(u, amount) => sys.buy_rex(&users[u], core(amount)).map(|_| ()),
                EngineOp::Sell(u, amount) => sys
                    .sell_rex(&users[u], Asset::new(amount * 10, REX_SYMBOL))
                    .map(|_| ()),
                EngineOp::Rent(u, payment, fund) => sys
                    .rent_cpu(&users[u], &users[u], core(payment), core(fund))
                    .map(|_| ()),
                EngineOp::Unstake(u, amount) => sys
                    .unstake_to_rex(&users[u], &users[u], core(amount), core(0))
                    .map(|_| ()),
                EngineOp::Advance(secs) => {
                    sys.host_mut().advance_secs(secs);
                    Ok(())
                }
                EngineOp::Exec(max) => sys.rex_exec(&users[0], max).map(|_| ()),
            };
            prop_assert!(sys.state().check_invariants().is_ok());
            prop_assert!(sys.pool().total_unlent.amount >= 0);
        }
    }
}
