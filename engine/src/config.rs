//! Configuration for the restaking engine
//!
//! Built once at startup and passed to every component explicitly.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{PositionKind, RestakerError, Result, RetryPolicy, StrategyKind};

/// Main restaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestakerConfig {
    pub chain: ChainConfig,
    pub position: PositionConfig,
    pub strategy: StrategyConfig,
    pub fees: FeeConfig,
    pub gain: GainConfig,
    pub prices: PriceConfig,
    pub schedule: ScheduleConfig,
    pub swap: SwapConfig,
    pub logging: LoggingConfig,
}

/// Ledger endpoints and well-known contract addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: String,

    /// Relay that sponsors gas while the wallet has free requests left
    pub sponsor_rpc_url: Option<String>,

    pub chain_id: u64,
    pub request_timeout_secs: u64,
    pub multicall_address: Address,
    pub staking_manager_address: Address,
    pub wrapped_native_address: Address,
    pub router_address: Address,
}

/// The monitored staking position
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub pool_address: Address,
    pub kind: PositionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub kind: StrategyKind,

    /// Native balance (whole units) the strategy tries to keep in the wallet
    pub min_reserve_balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Added to every gas estimate, capped at the block gas limit
    pub gas_buffer: u64,

    /// Proportional fee of the swap step
    pub swap_fee: f64,

    /// Successful invocations the gas median is taken over
    pub gas_history_samples: usize,

    pub explorer_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GainConfig {
    /// Trailing window the gain rate is measured over
    pub window_blocks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    pub base_url: String,
    pub platform: String,
}

/// Every wait the engine performs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub retry_policy_secs: Vec<u64>,
    pub receipt_poll_secs: Vec<u64>,

    /// Give up waiting for a receipt after this long; unbounded when unset
    pub receipt_max_wait_secs: Option<u64>,

    pub low_balance_cooldown_secs: u64,
    pub max_cycle_sleep_secs: u64,
    pub post_restake_sleep_secs: u64,

    /// Failed verification attempts after which a pending submission is dropped
    pub verification_abandon_after: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    pub slippage: f64,
    pub deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,

    /// Append-only event log; defaults to `log_<staking symbol>.txt`
    pub file: Option<String>,
}

fn known_address(hex: &str) -> Address {
    hex.parse().unwrap_or_default()
}

impl Default for RestakerConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            position: PositionConfig::default(),
            strategy: StrategyConfig::default(),
            fees: FeeConfig::default(),
            gain: GainConfig::default(),
            prices: PriceConfig::default(),
            schedule: ScheduleConfig::default(),
            swap: SwapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.roninchain.com/rpc".to_string(),
            sponsor_rpc_url: Some("https://proxy.roninchain.com/free-gas-rpc".to_string()),
            chain_id: 2020,
            request_timeout_secs: 30,
            multicall_address: known_address("0xc76d0d0d3aa608190f78db02bf2f5aef374fc0b9"),
            staking_manager_address: known_address("0x8bd81a19420bad681b7bfc20e703ebd8e253782d"),
            wrapped_native_address: known_address("0xe514d9deb7966c8be0ca922de8a064264ea6bcd4"),
            router_address: known_address("0x7d0556d55ca1a92708681e2e231733ebd922597d"),
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            pool_address: known_address("0x05b0bb3c1c320b280501b86706c3551995bc8571"),
            kind: PositionKind::Direct,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::OptimalInterval,
            min_reserve_balance: 1.0,
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            gas_buffer: 100_000,
            swap_fee: 0.003,
            gas_history_samples: 10,
            explorer_url: "https://explorerv3-api.roninchain.com".to_string(),
        }
    }
}

impl Default for GainConfig {
    fn default() -> Self {
        // ~1 day at 3s blocks
        Self { window_blocks: 28_800 }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            platform: "ronin".to_string(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let mut receipt_poll_secs = vec![3; 5];
        receipt_poll_secs.extend([10; 5]);
        receipt_poll_secs.extend([60; 5]);
        receipt_poll_secs.push(300);

        Self {
            retry_policy_secs: vec![5, 5, 60, 60, 60, 60, 60, 300, 300, 600, 3600, 21600, 43200],
            receipt_poll_secs,
            receipt_max_wait_secs: None,
            low_balance_cooldown_secs: 600,
            max_cycle_sleep_secs: 86_400,
            post_restake_sleep_secs: 86_400,
            verification_abandon_after: 10,
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            slippage: 0.01,
            deadline_secs: 30 * 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl RestakerConfig {
    /// Load from `config/restaker*` files layered with `RESTAKER__` environment overrides
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/restaker").required(false))
            .add_source(File::with_name("config/restaker-local").required(false))
            .add_source(Environment::with_prefix("RESTAKER").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Load from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RestakerError::Config(ConfigError::Foreign(Box::new(e))))?;

        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| RestakerError::Config(ConfigError::Foreign(Box::new(e))))?;

        Ok(config)
    }

    /// Write this configuration as YAML
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        Url::parse(&self.chain.rpc_url)
            .map_err(|e| ConfigError::Message(format!("invalid rpc_url: {}", e)))?;
        if let Some(sponsor) = &self.chain.sponsor_rpc_url {
            Url::parse(sponsor)
                .map_err(|e| ConfigError::Message(format!("invalid sponsor_rpc_url: {}", e)))?;
        }
        Url::parse(&self.fees.explorer_url)
            .map_err(|e| ConfigError::Message(format!("invalid explorer_url: {}", e)))?;
        Url::parse(&self.prices.base_url)
            .map_err(|e| ConfigError::Message(format!("invalid prices base_url: {}", e)))?;

        if self.position.pool_address.is_zero() {
            return Err(ConfigError::Message("pool_address must be set".into()));
        }
        if self.chain.request_timeout_secs == 0 {
            return Err(ConfigError::Message("request_timeout_secs must be greater than 0".into()));
        }

        if self.gain.window_blocks == 0 {
            return Err(ConfigError::Message("window_blocks must be greater than 0".into()));
        }
        if self.fees.gas_history_samples == 0 {
            return Err(ConfigError::Message("gas_history_samples must be greater than 0".into()));
        }
        if !(0.0..1.0).contains(&self.fees.swap_fee) {
            return Err(ConfigError::Message("swap_fee must be within [0, 1)".into()));
        }
        if !(0.0..1.0).contains(&self.swap.slippage) {
            return Err(ConfigError::Message("slippage must be within [0, 1)".into()));
        }
        if !self.strategy.min_reserve_balance.is_finite() || self.strategy.min_reserve_balance < 0.0 {
            return Err(ConfigError::Message("min_reserve_balance must be non-negative".into()));
        }

        if self.schedule.retry_policy_secs.is_empty() {
            return Err(ConfigError::Message("retry_policy_secs must not be empty".into()));
        }
        if self.schedule.receipt_poll_secs.is_empty() {
            return Err(ConfigError::Message("receipt_poll_secs must not be empty".into()));
        }
        if self.schedule.verification_abandon_after == 0 {
            return Err(ConfigError::Message("verification_abandon_after must be greater than 0".into()));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.chain.request_timeout_secs)
    }
}

impl ScheduleConfig {
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::from_secs(&self.retry_policy_secs)
    }

    pub fn receipt_poll_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::from_secs(&self.receipt_poll_secs)
    }

    pub fn receipt_max_wait(&self) -> Option<Duration> {
        self.receipt_max_wait_secs.map(Duration::from_secs)
    }

    pub fn low_balance_cooldown(&self) -> Duration {
        Duration::from_secs(self.low_balance_cooldown_secs)
    }

    pub fn max_cycle_sleep(&self) -> Duration {
        Duration::from_secs(self.max_cycle_sleep_secs)
    }

    pub fn post_restake_sleep(&self) -> Duration {
        Duration::from_secs(self.post_restake_sleep_secs)
    }
}
