//! USD price snapshot of the position's tokens

use std::sync::Arc;

use ethers::types::Address;
use restaker_chain::{ChainError, ChainView, PairReserves, PoolTokens, PriceFeed, TokenInfo};
use tracing::debug;

use crate::{PriceSnapshot, Result};

/// Builds a [`PriceSnapshot`] each cycle
#[derive(Clone)]
pub struct PriceOracle {
    feed: Arc<dyn PriceFeed>,
    chain: Arc<dyn ChainView>,
    tokens: PoolTokens,
}

impl PriceOracle {
    pub fn new(feed: Arc<dyn PriceFeed>, chain: Arc<dyn ChainView>, tokens: PoolTokens) -> Self {
        Self { feed, chain, tokens }
    }

    /// Tokens quoted by the feed; an LP staking token is priced from its sides
    fn quoted_tokens(&self) -> Vec<Address> {
        let mut tokens = vec![self.tokens.reward_token.address, self.tokens.native_token.address];
        match &self.tokens.pair {
            Some((token0, token1)) => {
                tokens.push(token0.address);
                tokens.push(token1.address);
            }
            None => tokens.push(self.tokens.staking_token.address),
        }
        tokens
    }

    pub async fn snapshot(&self) -> Result<PriceSnapshot> {
        let prices = self.feed.usd_prices(&self.quoted_tokens()).await?;
        let price_of = |token: &TokenInfo| {
            prices
                .get(&token.address)
                .copied()
                .ok_or_else(|| ChainError::price_unavailable(token.symbol.clone(), "missing from feed".to_string()))
        };

        let reward_token_usd = price_of(&self.tokens.reward_token)?;
        let native_token_usd = price_of(&self.tokens.native_token)?;
        let staking_token_usd = match &self.tokens.pair {
            Some((token0, token1)) => {
                let reserves = self.chain.pair_reserves().await?;
                lp_token_price(
                    &reserves,
                    (price_of(token0)?, token0.decimals),
                    (price_of(token1)?, token1.decimals),
                    self.tokens.staking_token.decimals,
                )
            }
            None => price_of(&self.tokens.staking_token)?,
        };

        let snapshot = PriceSnapshot {
            staking_token_usd,
            reward_token_usd,
            native_token_usd,
        };
        debug!(
            staking_usd = staking_token_usd,
            reward_usd = reward_token_usd,
            native_usd = native_token_usd,
            "Price snapshot"
        );
        Ok(snapshot)
    }
}

/// `(r0*p0/10^d0 + r1*p1/10^d1) / (supply/10^ds)`
pub fn lp_token_price(reserves: &PairReserves, side0: (f64, u8), side1: (f64, u8), lp_decimals: u8) -> f64 {
    let value0 = restaker_chain::to_units(reserves.reserve0, side0.1) * side0.0;
    let value1 = restaker_chain::to_units(reserves.reserve1, side1.1) * side1.0;
    let supply = restaker_chain::to_units(reserves.total_supply, lp_decimals);
    if supply <= 0.0 {
        return 0.0;
    }
    (value0 + value1) / supply
}
