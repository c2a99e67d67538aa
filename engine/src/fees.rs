//! Restake cost estimation
//!
//! [`RestakeGasEstimator`] prices the gas of one restake from historical
//! usage; [`FeeEstimator`] combines that with the live gas price and the
//! swap fee into a [`FeeEstimate`] in native units.

use std::sync::Arc;

use ethers::types::Address;
use futures::future::try_join_all;
use restaker_chain::GasUsageHistory;
use tracing::debug;

use crate::{ContractRole, FeeEstimate, PositionKind, Result};

/// Combines gas usage, gas price and swap fee
#[derive(Debug, Clone, Copy)]
pub struct FeeEstimator {
    swap_fee: f64,
}

impl FeeEstimator {
    pub fn new(swap_fee: f64) -> Self {
        Self { swap_fee }
    }

    /// Total cost of one restake.
    ///
    /// LP positions swap half of the reward left after gas, paying
    /// `swap_fee` on it. A reward smaller than the gas cost swaps nothing.
    pub fn estimate(
        &self,
        gas_units: u64,
        gas_price_native: f64,
        pending_reward_native: f64,
        kind: PositionKind,
    ) -> FeeEstimate {
        let gas_cost = gas_units as f64 * gas_price_native;

        let swap_fee_native = if kind.has_swap_step() {
            (self.swap_fee * (pending_reward_native - gas_cost) / 2.0).max(0.0)
        } else {
            0.0
        };

        FeeEstimate {
            gas_units,
            gas_price_native,
            swap_fee_native,
            total_native: gas_cost + swap_fee_native,
        }
    }
}

impl Default for FeeEstimator {
    fn default() -> Self {
        Self::new(0.003)
    }
}

/// Gas of one restake as the sum of each operation's historical median
#[derive(Clone)]
pub struct RestakeGasEstimator {
    history: Arc<dyn GasUsageHistory>,
    pool: Address,
    router: Address,
    samples: usize,
}

impl RestakeGasEstimator {
    pub fn new(history: Arc<dyn GasUsageHistory>, pool: Address, router: Address, samples: usize) -> Self {
        Self {
            history,
            pool,
            router,
            samples,
        }
    }

    fn contract(&self, role: ContractRole) -> Address {
        match role {
            ContractRole::StakingPool => self.pool,
            ContractRole::Router => self.router,
        }
    }

    /// Gas units of every operation of a restake of `kind`
    pub async fn estimate(&self, kind: PositionKind) -> Result<u64> {
        self.estimate_operations(kind.restake_operations()).await
    }

    /// Gas units of a subset of operations, e.g. what remains after a claim
    pub async fn estimate_operations(&self, operations: &[(ContractRole, &'static str)]) -> Result<u64> {
        let medians = try_join_all(operations.iter().map(|(role, signature)| {
            self.history
                .median_gas_used(self.contract(*role), signature, self.samples)
        }))
        .await?;

        let total: u64 = medians.iter().sum();
        debug!(operations = operations.len(), gas_units = total, "Estimated restake gas");
        Ok(total)
    }
}
