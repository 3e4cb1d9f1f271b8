//! Shared fixtures for engine unit tests

use super::ResourceSystem;
use crate::asset::{Asset, REX_SYMBOL};
use crate::config::Config;
use crate::host::MemoryHost;
use crate::time::{TimePoint, SECONDS_PER_DAY};
use crate::types::AccountName;
use crate::voting::FlatSchedule;

pub(crate) const DAY: i64 = SECONDS_PER_DAY;

pub(crate) const PRODUCER: &str = "prod.a";

pub(crate) fn acct(name: &str) -> AccountName {
    AccountName::new(name)
}

pub(crate) fn core(amount: i64) -> Asset {
    Asset::new(amount, crate::asset::Symbol::new("CORE", 4).unwrap())
}

pub(crate) fn rex(amount: i64) -> Asset {
    Asset::new(amount, REX_SYMBOL)
}

/// Test configuration: one producer satisfies the voting requirement
/// and the rent connector starts at 400.0000
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.rex.min_producers_voted = 1;
    config.rex.initial_rent_connector = 400_0000;
    config
}

pub(crate) fn setup_with(config: Config) -> ResourceSystem<MemoryHost> {
    let core = config.core_symbol().unwrap();
    let host = MemoryHost::new(core, TimePoint::from_secs(10 * DAY + 3_600));
    let mut sys = ResourceSystem::new(config, host)
        .unwrap()
        .with_schedule(FlatSchedule);
    sys.register_producer(&acct(PRODUCER)).unwrap();
    sys
}

pub(crate) fn setup() -> ResourceSystem<MemoryHost> {
    setup_with(test_config())
}

/// Fund `name` with `liquid` spare tokens, self-stake 1.0000 and vote
/// for the test producer
pub(crate) fn voter(sys: &mut ResourceSystem<MemoryHost>, name: &str, liquid: i64) -> AccountName {
    let account = acct(name);
    sys.host_mut().issue(&account, liquid + 1_0000);
    sys.delegate_bandwidth(&account, &account, core(5000), core(5000), false)
        .unwrap();
    sys.vote_producer(&account, None, vec![acct(PRODUCER)])
        .unwrap();
    account
}
