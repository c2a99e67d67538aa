//! Gain rate of the staked position over a trailing block window

use std::sync::Arc;

use restaker_chain::{to_units, ChainView};
use tracing::debug;

use crate::{GainRate, RestakerError, Result};

/// Measures the pool's proportional growth rate
#[derive(Clone)]
pub struct GainRateEstimator {
    chain: Arc<dyn ChainView>,
    reward_decimals: u8,
    staking_decimals: u8,
}

impl GainRateEstimator {
    pub fn new(chain: Arc<dyn ChainView>, reward_decimals: u8, staking_decimals: u8) -> Self {
        Self {
            chain,
            reward_decimals,
            staking_decimals,
        }
    }

    /// Growth per second over `[window_start, window_end]`, with rewards
    /// converted to staking-token value by `reward_to_staking_price_ratio`
    pub async fn estimate(
        &self,
        window_start: u64,
        window_end: u64,
        reward_to_staking_price_ratio: f64,
    ) -> Result<GainRate> {
        let start_ts = self.chain.block_timestamp(window_start).await?;
        let end_ts = self.chain.block_timestamp(window_end).await?;
        let elapsed_secs = end_ts as i64 - start_ts as i64;
        if elapsed_secs <= 0 {
            return Err(RestakerError::InsufficientWindowData { elapsed_secs });
        }

        let rewards = self.chain.interval_rewards(window_start, window_end).await?;
        let total_staked = self.chain.staking_total().await?;

        let reward = to_units(rewards.total_reward, self.reward_decimals);
        let staked = to_units(total_staked, self.staking_decimals);

        let rate = gain_rate(reward, staked, reward_to_staking_price_ratio, elapsed_secs as f64);
        debug!(
            window_start,
            window_end,
            elapsed_secs,
            reward,
            staked,
            gain_rate = rate,
            "Estimated gain rate"
        );
        Ok(rate)
    }

    /// Gain rate over the `window_blocks` blocks ending at `block_number`
    pub async fn trailing(
        &self,
        block_number: u64,
        window_blocks: u64,
        reward_to_staking_price_ratio: f64,
    ) -> Result<GainRate> {
        let start = block_number.saturating_sub(window_blocks);
        self.estimate(start, block_number, reward_to_staking_price_ratio).await
    }
}

/// `(reward / staked) * price_ratio / elapsed`; an empty pool earns nothing
pub fn gain_rate(total_reward: f64, total_staked: f64, price_ratio: f64, elapsed_secs: f64) -> GainRate {
    if total_staked <= 0.0 {
        return 0.0;
    }
    total_reward / total_staked * price_ratio / elapsed_secs
}

/// Annualised percentage for log lines
pub fn apr_percent(rate: GainRate) -> f64 {
    100.0 * rate * 60.0 * 60.0 * 24.0 * 365.0
}
