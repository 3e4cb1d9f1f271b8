//! Metrics collection for observability
//!
//! Prometheus metrics for the staking engine, kept in a private registry.
//!
//! # Metrics
//!
//! - `staking_actions_total` - Actions committed
//! - `staking_action_failures_total{code}` - Actions rolled back, by error code
//! - `staking_action_duration_seconds` - Histogram of action latencies
//! - `staking_rex_total_lendable` - Core tokens backing REX (base units)
//! - `staking_rex_total_lent` - Core tokens out on loans
//! - `staking_rex_total_unlent` - Core tokens available to lend
//! - `staking_rex_total_rex` - Outstanding REX shares
//! - `staking_rex_open_loans` - Open CPU and NET loans
//! - `staking_rex_queued_orders` - Sell orders waiting for liquidity
//! - `staking_rex_fund_balance` - Core tokens held in REX funds
//! - `staking_bandwidth_staked` - Core tokens delegated for bandwidth
//! - `staking_bandwidth_refunding` - Core tokens waiting out the refund delay

use crate::state::ChainState;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed actions
    pub actions_total: IntCounter,

    /// Rolled back actions by error code
    pub action_failures: IntCounterVec,

    /// Action duration histogram
    pub action_duration: Histogram,

    /// Pool lendable total
    pub total_lendable: IntGauge,

    /// Pool lent total
    pub total_lent: IntGauge,

    /// Pool unlent total
    pub total_unlent: IntGauge,

    /// Outstanding REX
    pub total_rex: IntGauge,

    /// Open loans
    pub open_loans: IntGauge,

    /// Queued sell orders
    pub queued_orders: IntGauge,

    /// Sum of REX fund balances
    pub fund_balance: IntGauge,

    /// Delegated bandwidth stake
    pub bandwidth_staked: IntGauge,

    /// Pending refunds
    pub bandwidth_refunding: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("actions_total", &self.actions_total.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let actions_total = IntCounter::new("staking_actions_total", "Actions committed")?;
        registry.register(Box::new(actions_total.clone()))?;

        let action_failures = IntCounterVec::new(
            Opts::new(
                "staking_action_failures_total",
                "Actions rolled back, by error code",
            ),
            &["code"],
        )?;
        registry.register(Box::new(action_failures.clone()))?;

        let action_duration = Histogram::with_opts(
            HistogramOpts::new(
                "staking_action_duration_seconds",
                "Histogram of action latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100]),
        )?;
        registry.register(Box::new(action_duration.clone()))?;

        let gauge = |name: &str, help: &str| -> prometheus::Result<IntGauge> {
            let gauge = IntGauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };
        let total_lendable = gauge("staking_rex_total_lendable", "Core tokens backing REX")?;
        let total_lent = gauge("staking_rex_total_lent", "Core tokens out on loans")?;
        let total_unlent = gauge("staking_rex_total_unlent", "Core tokens available to lend")?;
        let total_rex = gauge("staking_rex_total_rex", "Outstanding REX shares")?;
        let open_loans = gauge("staking_rex_open_loans", "Open CPU and NET loans")?;
        let queued_orders = gauge(
            "staking_rex_queued_orders",
            "Sell orders waiting for liquidity",
        )?;
        let fund_balance = gauge("staking_rex_fund_balance", "Core tokens held in REX funds")?;
        let bandwidth_staked = gauge(
            "staking_bandwidth_staked",
            "Core tokens delegated for bandwidth",
        )?;
        let bandwidth_refunding = gauge(
            "staking_bandwidth_refunding",
            "Core tokens waiting out the refund delay",
        )?;

        Ok(Self {
            actions_total,
            action_failures,
            action_duration,
            total_lendable,
            total_lent,
            total_unlent,
            total_rex,
            open_loans,
            queued_orders,
            fund_balance,
            bandwidth_staked,
            bandwidth_refunding,
            registry,
        })
    }

    /// Record the outcome of one action
    pub fn record_action<T>(&self, result: &crate::Result<T>) {
        match result {
            Ok(_) => self.actions_total.inc(),
            Err(err) => self.action_failures.with_label_values(&[err.code()]).inc(),
        }
    }

    /// Record action duration
    pub fn record_action_duration(&self, duration_seconds: f64) {
        self.action_duration.observe(duration_seconds);
    }

    /// Refresh the pool, queue and custody gauges from `state`
    pub fn observe_state(&self, state: &ChainState) {
        self.total_lendable.set(state.pool.total_lendable.amount);
        self.total_lent.set(state.pool.total_lent.amount);
        self.total_unlent.set(state.pool.total_unlent.amount);
        self.total_rex.set(state.pool.total_rex.amount);
        let loans = state.cpu_loans.len() + state.net_loans.len();
        self.open_loans.set(loans as i64);
        self.queued_orders.set(state.orders.len() as i64);
        self.fund_balance.set(state.funds.total());
        self.bandwidth_staked.set(state.bandwidth.total_staked());
        self.bandwidth_refunding.set(state.bandwidth.total_refunding());
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
