//! Staking engine node binary

use anyhow::Context;
use staking_core::{
    snapshot, spawn_system_actor, AccountName, Asset, Config, Host, MemoryHost, Metrics,
    ResourceSystem, TimePoint,
};

/// In-memory ledger read against the wall clock
#[derive(Debug, Clone)]
struct WallClockHost(MemoryHost);

impl Host for WallClockHost {
    fn now(&self) -> TimePoint {
        TimePoint::from_micros(chrono::Utc::now().timestamp_micros())
    }

    fn transfer(
        &mut self,
        from: &AccountName,
        to: &AccountName,
        amount: Asset,
        memo: &str,
    ) -> staking_core::Result<()> {
        self.0.transfer(from, to, amount, memo)
    }

    fn set_resource_limits(
        &mut self,
        account: &AccountName,
        net_weight: i64,
        cpu_weight: i64,
    ) -> staking_core::Result<()> {
        self.0.set_resource_limits(account, net_weight, cpu_weight)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match std::env::var("STAKING_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env().context("loading configuration from environment")?,
    };
    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting staking node"
    );

    let core = config.core_symbol()?;
    let now = TimePoint::from_secs(chrono::Utc::now().timestamp());
    let host = WallClockHost(MemoryHost::new(core, now));

    let snapshot_path = snapshot::snapshot_path(&config.data_dir);
    let system = match snapshot::load(&snapshot_path)? {
        Some(state) => {
            tracing::info!(last_action = %state.last_action_time, "Resuming from snapshot");
            ResourceSystem::with_state(config.clone(), host, state)?
        }
        None => ResourceSystem::new(config.clone(), host)?,
    };

    let metrics = Metrics::new()?;
    let (handle, task) = spawn_system_actor(system, config.mailbox_capacity, metrics);
    tracing::info!("Engine actor running");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down staking node");
    handle.shutdown().await?;
    let system = task.await?;
    let (state, _host) = system.into_parts();
    snapshot::save(&snapshot_path, &state)?;
    Ok(())
}
