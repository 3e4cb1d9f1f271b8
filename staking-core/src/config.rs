//! Configuration for the staking engine

use crate::asset::Symbol;
use crate::time::SECONDS_PER_DAY;
use crate::types::AccountName;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Data directory for state snapshots
    pub data_dir: PathBuf,

    /// Core token symbol, `precision,CODE`
    pub core_symbol: String,

    /// Actor mailbox capacity
    pub mailbox_capacity: usize,

    /// System custody accounts
    pub accounts: AccountsConfig,

    /// Bandwidth delegation configuration
    pub bandwidth: BandwidthConfig,

    /// Resource exchange configuration
    pub rex: RexConfig,

    /// Vote weight configuration
    pub voting: VotingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "staking-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::from("./data/staking"),
            core_symbol: "4,CORE".to_string(),
            mailbox_capacity: 1000,
            accounts: AccountsConfig::default(),
            bandwidth: BandwidthConfig::default(),
            rex: RexConfig::default(),
            voting: VotingConfig::default(),
        }
    }
}

/// System custody accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// Holds delegated and refunding tokens
    pub stake: AccountName,

    /// Holds REX funds and pool tokens
    pub rex: AccountName,

    /// Source of name auction proceeds
    pub names: AccountName,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            stake: AccountName::new("sys.stake"),
            rex: AccountName::new("sys.rex"),
            names: AccountName::new("sys.names"),
        }
    }
}

/// Bandwidth delegation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthConfig {
    /// Delay before unstaked tokens can be claimed (seconds)
    pub refund_delay_secs: i64,

    /// Self-delegation (net + cpu, base units) required before
    /// delegating to another account; zero disables the check
    pub min_self_stake: i64,
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            refund_delay_secs: 3 * SECONDS_PER_DAY, // 3 days
            min_self_stake: 1_0000,                 // 1.0000 core
        }
    }
}

/// Resource exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RexConfig {
    /// Loan term (days)
    pub loan_term_days: i64,

    /// Days until purchased REX becomes sellable
    pub maturity_days: i64,

    /// Smallest purchase that may seed an empty pool (base units)
    pub min_seed_amount: i64,

    /// Rent reserve seeded into an empty pool (base units)
    pub initial_rent_connector: i64,

    /// Producers a voter must back (absent a proxy) to buy REX
    pub min_producers_voted: usize,

    /// Housekeeping budget spent by every action
    pub housekeeping_batch: u16,

    /// Upper bound for the explicit housekeeping action
    pub max_housekeeping_batch: u16,
}

impl Default for RexConfig {
    fn default() -> Self {
        Self {
            loan_term_days: 30,
            maturity_days: 4,
            min_seed_amount: 1_0000,                 // 1.0000 core
            initial_rent_connector: 20_000_0000,     // 20,000.0000 core
            min_producers_voted: 21,
            housekeeping_batch: 2,
            max_housekeeping_batch: 100,
        }
    }
}

/// Vote weight configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Reference epoch of the weight schedule (seconds since Unix epoch)
    pub epoch_secs: i64,

    /// Weeks for vote weight to double
    pub doubling_weeks: u32,

    /// Maximum producers per vote
    pub max_producers: usize,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            epoch_secs: 946_684_800, // 2000-01-01T00:00:00Z
            doubling_weeks: 52,
            max_producers: 30,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("STAKING_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(symbol) = std::env::var("STAKING_CORE_SYMBOL") {
            config.core_symbol = symbol;
        }

        if let Ok(capacity) = std::env::var("STAKING_MAILBOX_CAPACITY") {
            config.mailbox_capacity = capacity.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid STAKING_MAILBOX_CAPACITY: {}", e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parsed core symbol
    pub fn core_symbol(&self) -> crate::Result<Symbol> {
        self.core_symbol.parse()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let core = self.core_symbol()?;
        if core == crate::asset::REX_SYMBOL {
            return Err(crate::Error::Config("core symbol cannot be REX".to_string()));
        }
        if self.rex.loan_term_days <= 0 || self.rex.maturity_days < 0 {
            return Err(crate::Error::Config(
                "loan term must be positive and maturity non-negative".to_string(),
            ));
        }
        if self.rex.min_seed_amount <= 0 || self.rex.initial_rent_connector <= 0 {
            return Err(crate::Error::Config(
                "pool seed amounts must be positive".to_string(),
            ));
        }
        if self.rex.housekeeping_batch > self.rex.max_housekeeping_batch {
            return Err(crate::Error::Config(
                "housekeeping batch exceeds its cap".to_string(),
            ));
        }
        if self.voting.doubling_weeks == 0 {
            return Err(crate::Error::Config("doubling_weeks must be positive".to_string()));
        }
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config("mailbox capacity must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "staking-core");
        assert_eq!(config.rex.loan_term_days, 30);
        assert_eq!(config.bandwidth.refund_delay_secs, 259_200);
        assert!(config.validate().is_ok());
        assert_eq!(config.core_symbol().unwrap().code(), "CORE");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staking.toml");
        let mut config = Config::default();
        config.core_symbol = "4,SYS".to_string();
        config.rex.initial_rent_connector = 400_0000;
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.core_symbol().unwrap().code(), "SYS");
        assert_eq!(loaded.rex.initial_rent_connector, 400_0000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.core_symbol = "4,REX".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rex.housekeeping_batch = 500;
        assert!(config.validate().is_err());
    }
}
