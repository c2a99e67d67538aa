//! In-memory ledger, chain view, price feed and gas history for engine tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::types::{transaction::eip2718::TypedTransaction, Address, Bytes, Log, H256, U256};
use restaker::{
    BalanceGuard, FeeEstimator, GainRateEstimator, LoopComponents, LoopSettings, PositionKind, PriceOracle,
    RestakeDecisionLoop, RestakeGasEstimator, Restaker, RetryPolicy, Strategy, StrategyKind, SubmitterSettings,
    TransactionSubmitter,
};
use restaker_chain::contracts::{PAIR_ABI, STAKING_POOL_ABI};
use restaker_chain::signer::wallet_from_key;
use restaker_chain::{
    AbiManager, BlockHeader, BlockRef, ChainError, ChainView, GasUsageHistory, LedgerClient, PairReserves,
    PoolTokens, PositionSnapshot, PriceFeed, Result, TokenInfo, TxReceipt, WindowRewards,
};

pub const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const DAY: f64 = 86_400.0;

/// Gas units of one whole restake, split evenly across its operations
pub const RESTAKE_GAS: u64 = 10_000_000;

pub fn pool() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn router() -> Address {
    Address::repeat_byte(0xbb)
}

/// `amount` whole tokens at 18 decimals
pub fn units(amount: u64) -> U256 {
    U256::from(amount) * U256::exp10(18)
}

pub fn token(byte: u8, symbol: &str) -> TokenInfo {
    TokenInfo {
        address: Address::repeat_byte(byte),
        symbol: symbol.to_string(),
        decimals: 18,
    }
}

pub fn direct_tokens() -> PoolTokens {
    PoolTokens {
        staking_token: token(1, "AXS"),
        reward_token: token(1, "AXS"),
        native_token: token(2, "WRON"),
        pair: None,
    }
}

/// AXS/WRON LP staked for WRON rewards; AXS is side 0 of the pair
pub fn lp_tokens() -> PoolTokens {
    PoolTokens {
        staking_token: token(0x10, "AXS-WRON"),
        reward_token: token(2, "WRON"),
        native_token: token(2, "WRON"),
        pair: Some((token(1, "AXS"), token(2, "WRON"))),
    }
}

pub fn lp_pair() -> Address {
    lp_tokens().staking_token.address
}

pub fn receipt_with(tx_hash: H256, logs: Vec<Log>, gas_used: u64) -> TxReceipt {
    TxReceipt {
        tx_hash,
        status: true,
        gas_used: U256::from(gas_used),
        effective_gas_price: Some(U256::from(1_000_000_000u64)),
        logs,
    }
}

/// `RewardClaimed(amount)` from the pool
pub fn reward_log(amount: U256) -> Log {
    let topic = AbiManager::event_topic(&STAKING_POOL_ABI, "RewardClaimed").unwrap();
    Log {
        address: pool(),
        topics: vec![topic, H256::zero()],
        data: Bytes::from(encode(&[Token::Uint(amount)])),
        ..Default::default()
    }
}

/// `Swap` from `pair` paying out `amount0_out` and `amount1_out`
pub fn swap_log(pair: Address, amount0_out: U256, amount1_out: U256) -> Log {
    let topic = AbiManager::event_topic(&PAIR_ABI, "Swap").unwrap();
    Log {
        address: pair,
        topics: vec![topic, H256::from(router()), H256::zero()],
        data: Bytes::from(encode(&[
            Token::Uint(U256::zero()),
            Token::Uint(U256::zero()),
            Token::Uint(amount0_out),
            Token::Uint(amount1_out),
        ])),
        ..Default::default()
    }
}

/// LP `Transfer` minting `value` from `pair`
pub fn transfer_log(pair: Address, value: U256) -> Log {
    let topic = AbiManager::event_topic(&PAIR_ABI, "Transfer").unwrap();
    Log {
        address: pair,
        topics: vec![topic, H256::zero(), H256::zero()],
        data: Bytes::from(encode(&[Token::Uint(value)])),
        ..Default::default()
    }
}

/// Successful receipt carrying one `RewardClaimed(amount)` log from the pool
pub fn reward_receipt(tx_hash: H256, amount: U256, gas_used: u64) -> TxReceipt {
    receipt_with(tx_hash, vec![reward_log(amount)], gas_used)
}

/// Scriptable [`LedgerClient`].
///
/// `transaction_count` and `send_raw_transaction` yield to the runtime and
/// track how many submissions sit between the two, so overlapping
/// submissions show up in `max_in_flight`.
pub struct StubLedger {
    pub gas_limit: Mutex<U256>,
    pub gas_estimate: Mutex<U256>,
    pub gas_price: Mutex<U256>,
    pub free_gas: Mutex<u64>,
    pub nonce: Mutex<U256>,
    pub balance: Mutex<U256>,

    /// Popped per receipt query; `Err` simulates a failing node
    pub receipts: Mutex<VecDeque<Result<Option<TxReceipt>>>>,

    /// Gas price reported for a known transaction
    pub tx_gas_price: Mutex<Option<U256>>,

    /// Every transaction passed to gas estimation, in order
    pub built: Mutex<Vec<TypedTransaction>>,

    pub sent: Mutex<Vec<Bytes>>,
    pub tx_hash: H256,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubLedger {
    pub fn new() -> Self {
        Self {
            gas_limit: Mutex::new(U256::from(30_000_000u64)),
            gas_estimate: Mutex::new(U256::from(50_000u64)),
            gas_price: Mutex::new(U256::from(1_000_000_000u64)),
            free_gas: Mutex::new(0),
            nonce: Mutex::new(U256::from(7u64)),
            balance: Mutex::new(units(100)),
            receipts: Mutex::new(VecDeque::new()),
            tx_gas_price: Mutex::new(None),
            built: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            tx_hash: H256::repeat_byte(0x99),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn push_receipt(&self, receipt: Result<Option<TxReceipt>>) {
        self.receipts.lock().unwrap().push_back(receipt);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn built_nonces(&self) -> Vec<U256> {
        self.built
            .lock()
            .unwrap()
            .iter()
            .filter_map(|tx| tx.nonce().copied())
            .collect()
    }

    pub fn built_tx(&self, index: usize) -> TypedTransaction {
        self.built.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LedgerClient for StubLedger {
    async fn block_number(&self) -> Result<u64> {
        Ok(100_000)
    }

    async fn block(&self, block: BlockRef) -> Result<BlockHeader> {
        let number = match block {
            BlockRef::Latest => 100_000,
            BlockRef::Number(n) => n,
        };
        Ok(BlockHeader {
            number,
            timestamp: number * 3,
            gas_limit: *self.gas_limit.lock().unwrap(),
        })
    }

    async fn balance(&self, _address: Address) -> Result<U256> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(*self.gas_price.lock().unwrap())
    }

    async fn transaction_count(&self, _address: Address) -> Result<U256> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(*self.nonce.lock().unwrap())
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        self.built.lock().unwrap().push(tx.clone());
        Ok(*self.gas_estimate.lock().unwrap())
    }

    async fn call(&self, _tx: &TypedTransaction, _block: Option<u64>) -> Result<Bytes> {
        Err(ChainError::internal("eth_call not scripted"))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        tokio::task::yield_now().await;
        *self.nonce.lock().unwrap() += U256::one();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(raw);
        Ok(self.tx_hash)
    }

    async fn transaction_receipt(&self, _hash: H256) -> Result<Option<TxReceipt>> {
        self.receipts.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn transaction_gas_price(&self, _hash: H256) -> Result<Option<U256>> {
        Ok(*self.tx_gas_price.lock().unwrap())
    }

    async fn free_gas_requests(&self, _address: Address) -> Result<u64> {
        Ok(*self.free_gas.lock().unwrap())
    }
}

/// Scriptable [`ChainView`]; one block every 3 seconds
pub struct StubChain {
    pub position: Mutex<PositionSnapshot>,
    pub tokens: PoolTokens,
    pub window_reward: U256,
    pub staking_total: U256,
    pub native_balance: Mutex<U256>,
    pub gas_price: U256,
    pub reserves: PairReserves,
}

impl StubChain {
    /// Staked 1000, pending 10, pool growing 0.1% per day
    pub fn direct() -> Self {
        Self {
            position: Mutex::new(PositionSnapshot {
                block_number: 100_000,
                pending_reward: units(10),
                staked_amount: units(1000),
                last_claim_timestamp: 0,
                can_claim: true,
                min_claim_window: 86_400,
            }),
            tokens: direct_tokens(),
            window_reward: units(1),
            staking_total: units(1000),
            native_balance: Mutex::new(units(100)),
            // 1e-6 native per gas unit
            gas_price: U256::from(1_000_000_000_000u64),
            reserves: PairReserves {
                reserve0: U256::zero(),
                reserve1: U256::zero(),
                total_supply: U256::zero(),
            },
        }
    }

    /// 1000 LP staked, 20 WRON pending; a 1:1 pool so every token is worth one native
    pub fn lp() -> Self {
        let chain = Self {
            tokens: lp_tokens(),
            reserves: PairReserves {
                reserve0: units(1000),
                reserve1: units(1000),
                total_supply: units(2000),
            },
            ..Self::direct()
        };
        chain.update_position(|p| p.pending_reward = units(20));
        chain
    }

    pub fn kind(&self) -> PositionKind {
        match self.tokens.pair {
            Some(_) => PositionKind::LiquidityPair,
            None => PositionKind::Direct,
        }
    }

    pub fn set_balance(&self, whole_units: u64) {
        *self.native_balance.lock().unwrap() = units(whole_units);
    }

    pub fn update_position(&self, f: impl FnOnce(&mut PositionSnapshot)) {
        f(&mut self.position.lock().unwrap());
    }
}

#[async_trait]
impl ChainView for StubChain {
    async fn pool_tokens(&self, _include_pair: bool) -> Result<PoolTokens> {
        Ok(self.tokens.clone())
    }

    async fn position(&self, _wallet: Address) -> Result<PositionSnapshot> {
        Ok(self.position.lock().unwrap().clone())
    }

    async fn interval_rewards(&self, from_block: u64, to_block: u64) -> Result<WindowRewards> {
        Ok(WindowRewards {
            from_block,
            to_block,
            total_reward: self.window_reward,
        })
    }

    async fn staking_total(&self) -> Result<U256> {
        Ok(self.staking_total)
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64> {
        Ok(block * 3)
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.position.lock().unwrap().block_number)
    }

    async fn native_balance(&self, _wallet: Address) -> Result<U256> {
        Ok(*self.native_balance.lock().unwrap())
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(self.gas_price)
    }

    async fn pair_reserves(&self) -> Result<PairReserves> {
        Ok(self.reserves)
    }
}

/// Every token costs one dollar
pub struct FlatPriceFeed;

#[async_trait]
impl PriceFeed for FlatPriceFeed {
    async fn usd_prices(&self, tokens: &[Address]) -> Result<HashMap<Address, f64>> {
        Ok(tokens.iter().map(|t| (*t, 1.0)).collect())
    }
}

/// Same median for every function
pub struct FixedGasHistory(pub u64);

#[async_trait]
impl GasUsageHistory for FixedGasHistory {
    async fn median_gas_used(&self, _contract: Address, _signature: &str, _samples: usize) -> Result<u64> {
        Ok(self.0)
    }
}

/// Receipt polling that never really sleeps
pub fn fast_submitter_settings() -> SubmitterSettings {
    SubmitterSettings {
        gas_buffer: 100_000,
        receipt_poll: RetryPolicy::new(vec![Duration::from_millis(1)]).unwrap(),
        receipt_max_wait: Some(Duration::from_millis(20)),
    }
}

pub fn loop_settings() -> LoopSettings {
    LoopSettings {
        window_blocks: 28_800,
        min_reserve_balance: 0.0,
        retry: RetryPolicy::from_secs(&[5, 5, 60]).unwrap(),
        max_cycle_sleep: Duration::from_secs(1_000 * 86_400),
        post_restake_sleep: Duration::from_secs(86_400),
        verification_abandon_after: 10,
    }
}

/// Restaker for the chain's position kind. A whole restake costs
/// [`RESTAKE_GAS`] units at 1e-6 native, i.e. 10 native
pub fn build_restaker(ledger: Arc<StubLedger>, chain: Arc<StubChain>) -> Restaker {
    let kind = chain.kind();
    let per_operation = RESTAKE_GAS / kind.restake_operations().len() as u64;

    let wallet = wallet_from_key(DEV_KEY, 2020).unwrap();
    let submitter = TransactionSubmitter::new(ledger, Arc::new(wallet), fast_submitter_settings());
    let gas = RestakeGasEstimator::new(Arc::new(FixedGasHistory(per_operation)), pool(), router(), 10);

    Restaker::new(
        kind,
        submitter,
        chain.clone(),
        gas,
        chain.tokens.clone(),
        pool(),
        router(),
        Default::default(),
        0.003,
    )
    .unwrap()
}

/// Decision loop over the chain's position; the fee is 10 native, 1% of the stake
pub fn build_loop(
    ledger: Arc<StubLedger>,
    chain: Arc<StubChain>,
    strategy: StrategyKind,
    settings: LoopSettings,
) -> RestakeDecisionLoop {
    let restaker = build_restaker(ledger, chain.clone());
    let tokens = chain.tokens.clone();

    let components = LoopComponents {
        chain: chain.clone(),
        restaker,
        prices: PriceOracle::new(Arc::new(FlatPriceFeed), chain.clone(), tokens.clone()),
        gain: GainRateEstimator::new(chain, tokens.reward_token.decimals, tokens.staking_token.decimals),
        fees: FeeEstimator::new(0.003),
        guard: BalanceGuard::new(Duration::from_secs(600)),
        strategy: Strategy::new(strategy),
    };
    RestakeDecisionLoop::new(components, settings)
}
