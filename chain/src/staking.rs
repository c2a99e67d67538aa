//! Read-only view of a staking pool and the wallet's position in it

use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, U256};
use tracing::debug;

use crate::contracts::{
    token_address, token_bool, token_string, token_uint, ViewCall, ERC20_ABI, PAIR_ABI,
    STAKING_MANAGER_ABI, STAKING_POOL_ABI,
};
use crate::{
    BlockRef, ChainError, LedgerClient, Multicall, PairReserves, PoolTokens, PositionSnapshot,
    Result, TokenInfo, WindowRewards,
};

/// Everything the decision engine reads from the ledger
#[async_trait]
pub trait ChainView: Send + Sync {
    /// Staking, reward and native token metadata; `include_pair` also
    /// resolves the two sides of an LP staking token
    async fn pool_tokens(&self, include_pair: bool) -> Result<PoolTokens>;

    /// Consistent snapshot of the wallet's position at one block
    async fn position(&self, wallet: Address) -> Result<PositionSnapshot>;

    /// Reward distributed by the pool over `[from_block, to_block]`
    async fn interval_rewards(&self, from_block: u64, to_block: u64) -> Result<WindowRewards>;

    /// Total amount staked in the pool
    async fn staking_total(&self) -> Result<U256>;

    async fn block_timestamp(&self, block: u64) -> Result<u64>;

    async fn block_number(&self) -> Result<u64>;

    async fn native_balance(&self, wallet: Address) -> Result<U256>;

    async fn gas_price(&self) -> Result<U256>;

    /// Reserves and supply of the LP staking token
    async fn pair_reserves(&self) -> Result<PairReserves>;
}

/// [`ChainView`] over the staking pool and manager contracts
#[derive(Clone)]
pub struct StakingChainView {
    ledger: Arc<dyn LedgerClient>,
    multicall: Multicall,
    pool: Address,
    staking_manager: Address,
    native_token: Address,
}

impl StakingChainView {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        multicall_address: Address,
        pool: Address,
        staking_manager: Address,
        native_token: Address,
    ) -> Self {
        let multicall = Multicall::new(ledger.clone(), multicall_address);
        Self {
            ledger,
            multicall,
            pool,
            staking_manager,
            native_token,
        }
    }

    pub fn pool(&self) -> Address {
        self.pool
    }

    async fn staking_token(&self) -> Result<Address> {
        let (_, results) = self
            .multicall
            .aggregate(&[ViewCall::new(self.pool, &STAKING_POOL_ABI, "getStakingToken", vec![])])
            .await?;
        token_address(first(&results, 0, "getStakingToken")?, "getStakingToken")
    }

    async fn token_infos(&self, addresses: &[Address]) -> Result<Vec<TokenInfo>> {
        let calls: Vec<ViewCall> = addresses
            .iter()
            .flat_map(|address| {
                [
                    ViewCall::new(*address, &ERC20_ABI, "symbol", vec![]),
                    ViewCall::new(*address, &ERC20_ABI, "decimals", vec![]),
                ]
            })
            .collect();

        let (_, results) = self.multicall.aggregate(&calls).await?;

        addresses
            .iter()
            .enumerate()
            .map(|(i, address)| {
                let symbol = token_string(first(&results, 2 * i, "symbol")?, "symbol")?;
                let decimals = token_uint(first(&results, 2 * i + 1, "decimals")?, "decimals")?;
                Ok(TokenInfo {
                    address: *address,
                    symbol,
                    decimals: decimals.low_u32() as u8,
                })
            })
            .collect()
    }
}

/// First output of the `index`-th call of a multicall result
fn first<'a>(results: &'a [Vec<Token>], index: usize, call: &str) -> Result<&'a Token> {
    results
        .get(index)
        .and_then(|outputs| outputs.first())
        .ok_or_else(|| ChainError::decode(call.to_string(), format!("missing result #{}", index)))
}

#[async_trait]
impl ChainView for StakingChainView {
    async fn pool_tokens(&self, include_pair: bool) -> Result<PoolTokens> {
        let (_, results) = self
            .multicall
            .aggregate(&[
                ViewCall::new(self.pool, &STAKING_POOL_ABI, "getStakingToken", vec![]),
                ViewCall::new(self.pool, &STAKING_POOL_ABI, "getRewardToken", vec![]),
            ])
            .await?;
        let staking = token_address(first(&results, 0, "getStakingToken")?, "getStakingToken")?;
        let reward = token_address(first(&results, 1, "getRewardToken")?, "getRewardToken")?;

        let mut addresses = vec![staking, reward, self.native_token];
        if include_pair {
            let (_, sides) = self
                .multicall
                .aggregate(&[
                    ViewCall::new(staking, &PAIR_ABI, "token0", vec![]),
                    ViewCall::new(staking, &PAIR_ABI, "token1", vec![]),
                ])
                .await?;
            addresses.push(token_address(first(&sides, 0, "token0")?, "token0")?);
            addresses.push(token_address(first(&sides, 1, "token1")?, "token1")?);
        }

        let mut infos = self.token_infos(&addresses).await?.into_iter();
        let mut next = |what: &str| {
            infos
                .next()
                .ok_or_else(|| ChainError::internal(format!("token info for {} missing", what)))
        };

        let staking_token = next("staking token")?;
        let reward_token = next("reward token")?;
        let native_token = next("native token")?;
        let pair = if include_pair {
            Some((next("token0")?, next("token1")?))
        } else {
            None
        };

        Ok(PoolTokens {
            staking_token,
            reward_token,
            native_token,
            pair,
        })
    }

    async fn position(&self, wallet: Address) -> Result<PositionSnapshot> {
        let user = Token::Address(wallet);
        let pool = Token::Address(self.pool);

        let (block_number, results) = self
            .multicall
            .aggregate(&[
                ViewCall::new(self.pool, &STAKING_POOL_ABI, "getPendingRewards", vec![user.clone()]),
                ViewCall::new(self.pool, &STAKING_POOL_ABI, "getStakingAmount", vec![user.clone()]),
                ViewCall::new(
                    self.staking_manager,
                    &STAKING_MANAGER_ABI,
                    "userRewardInfo",
                    vec![pool.clone(), user.clone()],
                ),
                ViewCall::new(self.staking_manager, &STAKING_MANAGER_ABI, "canObtainRewards", vec![pool, user]),
                ViewCall::new(self.staking_manager, &STAKING_MANAGER_ABI, "minClaimedTimeWindow", vec![]),
            ])
            .await?;

        let reward_info = results
            .get(2)
            .and_then(|outputs| outputs.get(2))
            .ok_or_else(|| ChainError::decode("userRewardInfo".to_string(), "missing lastClaimedTimestamp".to_string()))?;

        let snapshot = PositionSnapshot {
            block_number,
            pending_reward: token_uint(first(&results, 0, "getPendingRewards")?, "getPendingRewards")?,
            staked_amount: token_uint(first(&results, 1, "getStakingAmount")?, "getStakingAmount")?,
            last_claim_timestamp: token_uint(reward_info, "userRewardInfo")?.low_u64(),
            can_claim: token_bool(first(&results, 3, "canObtainRewards")?, "canObtainRewards")?,
            min_claim_window: token_uint(first(&results, 4, "minClaimedTimeWindow")?, "minClaimedTimeWindow")?
                .low_u64(),
        };

        debug!(
            block_number,
            pending_reward = %snapshot.pending_reward,
            staked_amount = %snapshot.staked_amount,
            can_claim = snapshot.can_claim,
            "Position snapshot"
        );
        Ok(snapshot)
    }

    async fn interval_rewards(&self, from_block: u64, to_block: u64) -> Result<WindowRewards> {
        let (_, results) = self
            .multicall
            .aggregate(&[ViewCall::new(
                self.staking_manager,
                &STAKING_MANAGER_ABI,
                "getIntervalRewards",
                vec![
                    Token::Address(self.pool),
                    Token::Uint(U256::from(from_block)),
                    Token::Uint(U256::from(to_block)),
                ],
            )])
            .await?;

        Ok(WindowRewards {
            from_block,
            to_block,
            total_reward: token_uint(first(&results, 0, "getIntervalRewards")?, "getIntervalRewards")?,
        })
    }

    async fn staking_total(&self) -> Result<U256> {
        let (_, results) = self
            .multicall
            .aggregate(&[ViewCall::new(self.pool, &STAKING_POOL_ABI, "getStakingTotal", vec![])])
            .await?;
        token_uint(first(&results, 0, "getStakingTotal")?, "getStakingTotal")
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64> {
        Ok(self.ledger.block(BlockRef::Number(block)).await?.timestamp)
    }

    async fn block_number(&self) -> Result<u64> {
        self.ledger.block_number().await
    }

    async fn native_balance(&self, wallet: Address) -> Result<U256> {
        self.ledger.balance(wallet).await
    }

    async fn gas_price(&self) -> Result<U256> {
        self.ledger.gas_price().await
    }

    async fn pair_reserves(&self) -> Result<PairReserves> {
        let pair = self.staking_token().await?;
        let (_, results) = self
            .multicall
            .aggregate(&[
                ViewCall::new(pair, &PAIR_ABI, "getReserves", vec![]),
                ViewCall::new(pair, &PAIR_ABI, "totalSupply", vec![]),
            ])
            .await?;

        let reserves = results
            .first()
            .filter(|outputs| outputs.len() >= 2)
            .ok_or_else(|| ChainError::decode("getReserves".to_string(), "short output".to_string()))?;

        Ok(PairReserves {
            reserve0: token_uint(&reserves[0], "getReserves")?,
            reserve1: token_uint(&reserves[1], "getReserves")?,
            total_supply: token_uint(first(&results, 1, "totalSupply")?, "totalSupply")?,
        })
    }
}
