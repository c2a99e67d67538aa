//! Restake timing strategies

use tracing::info;

use crate::optimizer::{estimated_elapsed_secs, optimal_interval_secs, secs_to_duration, time_to_restake_secs};
use crate::{FeeEstimate, GainRate, RestakeDecision, Result, StrategyKind};

const SECS_PER_DAY: f64 = 86_400.0;

/// Everything a strategy looks at, in native units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleInputs {
    pub pending_reward_native: f64,
    pub staked_native: f64,
    pub fee: FeeEstimate,
    pub gain_rate: GainRate,

    /// Reserve above the configured minimum; negative when below it
    pub usable_reserve_native: f64,
}

/// Decides whether to act this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    kind: StrategyKind,
}

impl Strategy {
    pub fn new(kind: StrategyKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn decide(&self, inputs: &CycleInputs) -> Result<RestakeDecision> {
        let wait_secs = match self.kind {
            StrategyKind::Immediate => 0.0,
            StrategyKind::OptimalInterval => Self::optimal_wait_secs(inputs)?,
        };

        if wait_secs <= 0.0 {
            Ok(RestakeDecision::Act)
        } else {
            Ok(RestakeDecision::WaitUntil(secs_to_duration(wait_secs)))
        }
    }

    fn optimal_wait_secs(inputs: &CycleInputs) -> Result<f64> {
        if inputs.staked_native <= 0.0 {
            info!("Nothing staked, no restake interval to optimise");
            return Ok(f64::INFINITY);
        }

        // A reserve below its minimum is paid back out of the next restake
        let fees = inputs.fee.inflated_by((-inputs.usable_reserve_native).max(0.0));

        let elapsed = estimated_elapsed_secs(inputs.pending_reward_native, inputs.staked_native, inputs.gain_rate);
        info!("Estimated elapsed time: {:.2} days", elapsed / SECS_PER_DAY);

        let optimal = optimal_interval_secs(fees.total_native / inputs.staked_native, inputs.gain_rate)?;
        info!("Optimal restake interval: {:.2} days", optimal / SECS_PER_DAY);

        let wait = time_to_restake_secs(optimal, elapsed);
        info!("Time to restake: {:.2} days", wait / SECS_PER_DAY);
        Ok(wait)
    }
}
