//! Core data types shared by the chain layer and the engine

use ethers::types::{Address, Bytes, Log, TransactionReceipt, H256, U256, U64};
use serde::{Deserialize, Serialize};

/// Block selector for header lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    /// Most recent block known to the node
    Latest,

    /// Specific block height
    Number(u64),
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockRef::Latest => write!(f, "latest"),
            BlockRef::Number(n) => write!(f, "{}", n),
        }
    }
}

/// The parts of a block header the engine cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    /// Unix timestamp in seconds
    pub timestamp: u64,
    pub gas_limit: U256,
}

/// Ledger-confirmed outcome of a submitted transaction
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: H256,

    /// `true` when the transaction executed successfully
    pub status: bool,

    pub gas_used: U256,

    /// Not every node returns it
    pub effective_gas_price: Option<U256>,

    pub logs: Vec<Log>,
}

impl From<TransactionReceipt> for TxReceipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            status: receipt.status == Some(U64::from(1)),
            gas_used: receipt.gas_used.unwrap_or_default(),
            effective_gas_price: receipt.effective_gas_price,
            logs: receipt.logs,
        }
    }
}

/// ERC20 token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Tokens involved in a staking pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTokens {
    pub staking_token: TokenInfo,
    pub reward_token: TokenInfo,

    /// Wrapped native token, the unit fees are paid in
    pub native_token: TokenInfo,

    /// The two sides of the staking token when it is an LP token
    pub pair: Option<(TokenInfo, TokenInfo)>,
}

/// Read-only snapshot of the wallet's position, taken at a single block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub block_number: u64,
    pub pending_reward: U256,
    pub staked_amount: U256,
    pub last_claim_timestamp: u64,
    pub can_claim: bool,
    /// Seconds that must pass between two claims
    pub min_claim_window: u64,
}

/// Reserves and supply of an LP pair token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairReserves {
    pub reserve0: U256,
    pub reserve1: U256,
    pub total_supply: U256,
}

/// Reward distributed by the pool over a block window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRewards {
    pub from_block: u64,
    pub to_block: u64,
    pub total_reward: U256,
}

/// A state-changing contract call ready to be wrapped in a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Human readable operation name used in logs and errors
    pub label: &'static str,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl ContractCall {
    pub fn new(label: &'static str, to: Address, data: Bytes) -> Self {
        Self {
            label,
            to,
            data,
            value: U256::zero(),
        }
    }

    /// Attach native value to the call
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Convert a raw integer amount into whole token units
pub fn to_units(value: U256, decimals: u8) -> f64 {
    let raw: f64 = value.to_string().parse().unwrap_or(f64::INFINITY);
    raw / 10f64.powi(decimals as i32)
}

/// Convert whole token units into a raw integer amount, truncating dust
pub fn from_units(amount: f64, decimals: u8) -> U256 {
    if !amount.is_finite() || amount <= 0.0 {
        return U256::zero();
    }
    let raw = (amount * 10f64.powi(decimals as i32)).floor();
    U256::from_dec_str(&format!("{:.0}", raw)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        let one_and_half = U256::from(1_500_000_000_000_000_000u128);
        assert!((to_units(one_and_half, 18) - 1.5).abs() < 1e-12);
        assert_eq!(from_units(1.5, 18), one_and_half);
        assert_eq!(from_units(2.0, 6), U256::from(2_000_000u64));
    }

    #[test]
    fn test_from_units_rejects_non_positive() {
        assert_eq!(from_units(-1.0, 18), U256::zero());
        assert_eq!(from_units(f64::NAN, 18), U256::zero());
    }

    #[test]
    fn test_contract_call_value() {
        let call = ContractCall::new("stake", Address::zero(), Bytes::default())
            .with_value(U256::from(7u64));
        assert_eq!(call.value, U256::from(7u64));
        assert_eq!(call.label, "stake");
    }
}
