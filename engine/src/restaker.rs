//! Restake execution per position kind

use std::sync::Arc;

use ethers::types::{Address, U256};
use restaker_chain::contracts::{PAIR_ABI, STAKING_POOL_ABI};
use restaker_chain::{from_units, to_units, AbiManager, ChainView, PairReserves, PoolTokens, StakingCalls, TokenInfo};
use tracing::{info, warn};

use crate::config::SwapConfig;
use crate::fees::RestakeGasEstimator;
use crate::submitter::{single_log, TransactionSubmitter};
use crate::{PositionKind, RestakeReport, RestakerError, Result};

/// Which side of the pair is the native token
#[derive(Debug, Clone)]
struct PairSides {
    other: TokenInfo,

    /// Index (0 or 1) of the non-native token in the pair
    other_index: usize,
}

/// Performs the act step of the decision loop
#[derive(Clone)]
pub struct Restaker {
    kind: PositionKind,
    submitter: TransactionSubmitter,
    chain: Arc<dyn ChainView>,
    gas: RestakeGasEstimator,
    tokens: PoolTokens,
    pool: Address,
    router: Address,
    swap: SwapConfig,
    swap_fee: f64,
    pair: Option<PairSides>,
}

impl Restaker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: PositionKind,
        submitter: TransactionSubmitter,
        chain: Arc<dyn ChainView>,
        gas: RestakeGasEstimator,
        tokens: PoolTokens,
        pool: Address,
        router: Address,
        swap: SwapConfig,
        swap_fee: f64,
    ) -> Result<Self> {
        let pair = match kind {
            PositionKind::Direct => None,
            PositionKind::LiquidityPair => Some(Self::pair_sides(&tokens)?),
        };

        Ok(Self {
            kind,
            submitter,
            chain,
            gas,
            tokens,
            pool,
            router,
            swap,
            swap_fee,
            pair,
        })
    }

    fn pair_sides(tokens: &PoolTokens) -> Result<PairSides> {
        let (token0, token1) = tokens
            .pair
            .as_ref()
            .ok_or_else(|| RestakerError::UnsupportedPosition("LP position without pair tokens".into()))?;

        let native = tokens.native_token.address;
        if tokens.reward_token.address != native {
            return Err(RestakerError::UnsupportedPosition(format!(
                "reward token {} is not the wrapped native token",
                tokens.reward_token.symbol
            )));
        }

        if token1.address == native {
            Ok(PairSides {
                other: token0.clone(),
                other_index: 0,
            })
        } else if token0.address == native {
            Ok(PairSides {
                other: token1.clone(),
                other_index: 1,
            })
        } else {
            Err(RestakerError::UnsupportedPosition(format!(
                "wrapped native token is not in the {}/{} pair",
                token0.symbol, token1.symbol
            )))
        }
    }

    pub fn kind(&self) -> PositionKind {
        self.kind
    }

    pub fn tokens(&self) -> &PoolTokens {
        &self.tokens
    }

    pub fn submitter(&self) -> &TransactionSubmitter {
        &self.submitter
    }

    /// Gas units of one full restake
    pub async fn estimate_gas(&self) -> Result<u64> {
        self.gas.estimate(self.kind).await
    }

    /// Restake the pending reward
    pub async fn restake(&self) -> Result<RestakeReport> {
        match (self.kind, &self.pair) {
            (PositionKind::Direct, _) => self.restake_direct().await,
            (PositionKind::LiquidityPair, Some(pair)) => self.restake_liquidity_pair(pair).await,
            (PositionKind::LiquidityPair, None) => {
                Err(RestakerError::UnsupportedPosition("LP position without pair tokens".into()))
            }
        }
    }

    async fn restake_direct(&self) -> Result<RestakeReport> {
        let call = StakingCalls::restake_rewards(self.pool)?;
        let receipt = self.submitter.submit(&call).await?;

        let params = single_log(&receipt, self.pool, &STAKING_POOL_ABI, "RewardClaimed", call.label)?;
        let restaked_amount = AbiManager::event_uint(&params, "_amount")?;

        info!(
            "Restaked {} {}",
            to_units(restaked_amount, self.tokens.reward_token.decimals),
            self.tokens.reward_token.symbol
        );
        Ok(RestakeReport {
            gas_used: receipt.gas_used,
            restaked_amount,
        })
    }

    async fn restake_liquidity_pair(&self, pair: &PairSides) -> Result<RestakeReport> {
        let (claimed, mut gas_used) = self.claim().await?;

        let usable = self.usable_reward(claimed).await?;
        if usable.is_zero() {
            warn!("Claimed rewards lower than estimated gas fees. Restaking aborted.");
            return Ok(RestakeReport {
                gas_used,
                restaked_amount: U256::zero(),
            });
        }
        info!(
            "Usable rewards: {} {}",
            to_units(usable, self.tokens.reward_token.decimals),
            self.tokens.reward_token.symbol
        );

        let (swapped, swap_gas) = self.swap_native_for_token(pair, usable / U256::from(2u64)).await?;
        gas_used += swap_gas;

        let (minted, liquidity_gas) = self.add_liquidity(pair, swapped).await?;
        gas_used += liquidity_gas;

        let stake = StakingCalls::stake(self.pool, minted)?;
        let receipt = self.submitter.submit(&stake).await?;
        gas_used += receipt.gas_used;

        info!(
            "Staked {} {}",
            to_units(minted, self.tokens.staking_token.decimals),
            self.tokens.staking_token.symbol
        );
        Ok(RestakeReport {
            gas_used,
            restaked_amount: minted,
        })
    }

    async fn claim(&self) -> Result<(U256, U256)> {
        let call = StakingCalls::claim_pending_rewards(self.pool)?;
        let receipt = self.submitter.submit(&call).await?;

        let params = single_log(&receipt, self.pool, &STAKING_POOL_ABI, "RewardClaimed", call.label)?;
        let claimed = AbiManager::event_uint(&params, "_amount")?;
        info!(
            "Claimed {} {}",
            to_units(claimed, self.tokens.reward_token.decimals),
            self.tokens.reward_token.symbol
        );
        Ok((claimed, receipt.gas_used))
    }

    /// Claimed reward minus the estimated gas cost of a whole restake
    async fn usable_reward(&self, claimed: U256) -> Result<U256> {
        let restake_gas = self.gas.estimate(self.kind).await?;
        let gas_price = self.chain.gas_price().await?;
        let restake_cost = gas_price.saturating_mul(U256::from(restake_gas));
        Ok(claimed.saturating_sub(restake_cost))
    }

    /// Price of the pair's non-native token in native raw units per token raw unit
    async fn other_token_price(&self, pair: &PairSides) -> Result<f64> {
        let reserves = self.chain.pair_reserves().await?;
        pool_price(&reserves, pair.other_index)
    }

    fn deadline(&self) -> u64 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        now + self.swap.deadline_secs
    }

    async fn swap_native_for_token(&self, pair: &PairSides, native_in: U256) -> Result<(U256, U256)> {
        let price = self.other_token_price(pair).await?;
        let expected = to_units(native_in, 0) / price * (1.0 - self.swap_fee);
        let amount_out_min = from_units((1.0 - self.swap.slippage) * expected, 0);

        let call = StakingCalls::swap_exact_native_for_tokens(
            self.router,
            native_in,
            amount_out_min,
            vec![self.tokens.native_token.address, pair.other.address],
            self.submitter.wallet(),
            self.deadline(),
        )?;
        let receipt = self.submitter.submit(&call).await?;

        let staking_token = self.tokens.staking_token.address;
        let params = single_log(&receipt, staking_token, &PAIR_ABI, "Swap", call.label)?;
        let key = format!("_amount{}Out", pair.other_index);
        let swapped = AbiManager::event_uint(&params, &key)?;

        info!(
            "Swapped {} {} for {} {}",
            to_units(native_in, self.tokens.native_token.decimals),
            self.tokens.native_token.symbol,
            to_units(swapped, pair.other.decimals),
            pair.other.symbol
        );
        Ok((swapped, receipt.gas_used))
    }

    async fn add_liquidity(&self, pair: &PairSides, token_amount: U256) -> Result<(U256, U256)> {
        let price = self.other_token_price(pair).await?;
        let native_amount = price * to_units(token_amount, 0);
        let value = from_units(native_amount * (1.0 + self.swap.slippage), 0);
        let native_min = from_units(native_amount * (1.0 - self.swap.slippage), 0);

        let call = StakingCalls::add_liquidity_native(
            self.router,
            pair.other.address,
            token_amount,
            value,
            native_min,
            self.submitter.wallet(),
            self.deadline(),
        )?;
        let receipt = self.submitter.submit(&call).await?;

        let staking_token = self.tokens.staking_token.address;
        let params = single_log(&receipt, staking_token, &PAIR_ABI, "Transfer", call.label)?;
        let minted = AbiManager::event_uint(&params, "_value")?;
        Ok((minted, receipt.gas_used))
    }
}

/// Spot price of token `index` in units of the other token, from reserves
pub fn pool_price(reserves: &PairReserves, index: usize) -> Result<f64> {
    let (own, other) = if index == 0 {
        (reserves.reserve0, reserves.reserve1)
    } else {
        (reserves.reserve1, reserves.reserve0)
    };
    if own.is_zero() {
        return Err(RestakerError::internal("pair has no liquidity"));
    }
    Ok(to_units(other, 0) / to_units(own, 0))
}
