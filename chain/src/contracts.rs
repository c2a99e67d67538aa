//! Contract ABIs and call encoding
//!
//! Holds the JSON ABIs of the contracts the restaker touches and helpers
//! for encoding calls and decoding their outputs and event logs.

use ethers::abi::{Abi, RawLog, Token};
use ethers::types::{Address, Bytes, Log, H256, U256};
use once_cell::sync::Lazy;
use serde_json::json;

use crate::{types::ContractCall, ChainError, Result};

/// Single-token staking pool ABI
pub static STAKING_POOL_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_value(json!([
        {"inputs": [], "name": "getStakingToken", "outputs": [{"name": "", "type": "address"}], "stateMutability": "view", "type": "function"},
        {"inputs": [], "name": "getRewardToken", "outputs": [{"name": "", "type": "address"}], "stateMutability": "view", "type": "function"},
        {"inputs": [{"name": "_user", "type": "address"}], "name": "getPendingRewards", "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view", "type": "function"},
        {"inputs": [{"name": "_user", "type": "address"}], "name": "getStakingAmount", "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view", "type": "function"},
        {"inputs": [], "name": "getStakingTotal", "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view", "type": "function"},
        {"inputs": [], "name": "restakeRewards", "outputs": [], "stateMutability": "nonpayable", "type": "function"},
        {"inputs": [], "name": "claimPendingRewards", "outputs": [], "stateMutability": "nonpayable", "type": "function"},
        {"inputs": [{"name": "_amount", "type": "uint256"}], "name": "stake", "outputs": [], "stateMutability": "nonpayable", "type": "function"},
        {
            "anonymous": false,
            "inputs": [
                {"indexed": true, "name": "_user", "type": "address"},
                {"indexed": false, "name": "_amount", "type": "uint256"}
            ],
            "name": "RewardClaimed",
            "type": "event"
        }
    ]))
    .expect("Valid staking pool ABI")
});

/// Staking manager ABI (reward accounting shared by all pools)
pub static STAKING_MANAGER_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_value(json!([
        {
            "inputs": [
                {"name": "_poolAddr", "type": "address"},
                {"name": "_fromBlock", "type": "uint256"},
                {"name": "_toBlock", "type": "uint256"}
            ],
            "name": "getIntervalRewards",
            "outputs": [{"name": "", "type": "uint256"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [{"name": "_poolAddr", "type": "address"}, {"name": "_user", "type": "address"}],
            "name": "userRewardInfo",
            "outputs": [
                {"name": "debited", "type": "uint256"},
                {"name": "credited", "type": "uint256"},
                {"name": "lastClaimedTimestamp", "type": "uint256"}
            ],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [{"name": "_poolAddr", "type": "address"}, {"name": "_user", "type": "address"}],
            "name": "canObtainRewards",
            "outputs": [{"name": "", "type": "bool"}],
            "stateMutability": "view",
            "type": "function"
        },
        {"inputs": [], "name": "minClaimedTimeWindow", "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view", "type": "function"}
    ]))
    .expect("Valid staking manager ABI")
});

/// ERC20 contract ABI
pub static ERC20_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_value(json!([
        {"constant": true, "inputs": [{"name": "_owner", "type": "address"}], "name": "balanceOf", "outputs": [{"name": "balance", "type": "uint256"}], "type": "function"},
        {"constant": true, "inputs": [], "name": "decimals", "outputs": [{"name": "", "type": "uint8"}], "type": "function"},
        {"constant": true, "inputs": [], "name": "symbol", "outputs": [{"name": "", "type": "string"}], "type": "function"},
        {"constant": true, "inputs": [], "name": "totalSupply", "outputs": [{"name": "", "type": "uint256"}], "type": "function"}
    ]))
    .expect("Valid ERC20 ABI")
});

/// Constant-product pair ABI (the LP staking token)
pub static PAIR_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_value(json!([
        {"inputs": [], "name": "token0", "outputs": [{"name": "", "type": "address"}], "stateMutability": "view", "type": "function"},
        {"inputs": [], "name": "token1", "outputs": [{"name": "", "type": "address"}], "stateMutability": "view", "type": "function"},
        {"inputs": [], "name": "totalSupply", "outputs": [{"name": "", "type": "uint256"}], "stateMutability": "view", "type": "function"},
        {
            "inputs": [],
            "name": "getReserves",
            "outputs": [
                {"name": "_reserve0", "type": "uint112"},
                {"name": "_reserve1", "type": "uint112"},
                {"name": "_blockTimestampLast", "type": "uint32"}
            ],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "anonymous": false,
            "inputs": [
                {"indexed": true, "name": "_sender", "type": "address"},
                {"indexed": false, "name": "_amount0In", "type": "uint256"},
                {"indexed": false, "name": "_amount1In", "type": "uint256"},
                {"indexed": false, "name": "_amount0Out", "type": "uint256"},
                {"indexed": false, "name": "_amount1Out", "type": "uint256"},
                {"indexed": true, "name": "_to", "type": "address"}
            ],
            "name": "Swap",
            "type": "event"
        },
        {
            "anonymous": false,
            "inputs": [
                {"indexed": true, "name": "_from", "type": "address"},
                {"indexed": true, "name": "_to", "type": "address"},
                {"indexed": false, "name": "_value", "type": "uint256"}
            ],
            "name": "Transfer",
            "type": "event"
        }
    ]))
    .expect("Valid pair ABI")
});

/// Swap router ABI (native-token entry points only)
pub static ROUTER_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_value(json!([
        {
            "inputs": [
                {"name": "_amountOutMin", "type": "uint256"},
                {"name": "_path", "type": "address[]"},
                {"name": "_to", "type": "address"},
                {"name": "_deadline", "type": "uint256"}
            ],
            "name": "swapExactRONForTokens",
            "outputs": [{"name": "_amounts", "type": "uint256[]"}],
            "stateMutability": "payable",
            "type": "function"
        },
        {
            "inputs": [
                {"name": "_token", "type": "address"},
                {"name": "_amountTokenDesired", "type": "uint256"},
                {"name": "_amountTokenMin", "type": "uint256"},
                {"name": "_amountRONMin", "type": "uint256"},
                {"name": "_to", "type": "address"},
                {"name": "_deadline", "type": "uint256"}
            ],
            "name": "addLiquidityRON",
            "outputs": [
                {"name": "_amountToken", "type": "uint256"},
                {"name": "_amountRON", "type": "uint256"},
                {"name": "_liquidity", "type": "uint256"}
            ],
            "stateMutability": "payable",
            "type": "function"
        }
    ]))
    .expect("Valid router ABI")
});

/// Multicall2 aggregator ABI
pub static MULTICALL2_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_value(json!([
        {
            "inputs": [
                {
                    "components": [
                        {"name": "target", "type": "address"},
                        {"name": "callData", "type": "bytes"}
                    ],
                    "name": "calls",
                    "type": "tuple[]"
                }
            ],
            "name": "aggregate",
            "outputs": [
                {"name": "blockNumber", "type": "uint256"},
                {"name": "returnData", "type": "bytes[]"}
            ],
            "stateMutability": "nonpayable",
            "type": "function"
        }
    ]))
    .expect("Valid Multicall2 ABI")
});

/// A read-only call queued for the aggregator: target, ABI and function
#[derive(Debug, Clone)]
pub struct ViewCall {
    pub target: Address,
    pub abi: &'static Lazy<Abi>,
    pub function: &'static str,
    pub args: Vec<Token>,
}

impl ViewCall {
    pub fn new(target: Address, abi: &'static Lazy<Abi>, function: &'static str, args: Vec<Token>) -> Self {
        Self {
            target,
            abi,
            function,
            args,
        }
    }

    /// Calldata for this call
    pub fn encode(&self) -> Result<Bytes> {
        AbiManager::encode_function_call(self.abi, self.function, &self.args)
    }

    /// Decode the raw return data of this call
    pub fn decode(&self, output: &[u8]) -> Result<Vec<Token>> {
        AbiManager::decode_function_output(self.abi, self.function, output)
    }
}

/// ABI manager for encoding/decoding contract calls
pub struct AbiManager;

impl AbiManager {
    /// Encode a function call
    pub fn encode_function_call(abi: &Abi, function_name: &str, params: &[Token]) -> Result<Bytes> {
        let function = abi.function(function_name).map_err(|e| {
            ChainError::Abi(format!("Function {} not found in ABI: {}", function_name, e))
        })?;

        let encoded = function
            .encode_input(params)
            .map_err(|e| ChainError::Abi(format!("Failed to encode {}: {}", function_name, e)))?;

        Ok(Bytes::from(encoded))
    }

    /// Decode function output
    pub fn decode_function_output(abi: &Abi, function_name: &str, output: &[u8]) -> Result<Vec<Token>> {
        let function = abi.function(function_name).map_err(|e| {
            ChainError::Abi(format!("Function {} not found in ABI: {}", function_name, e))
        })?;

        function
            .decode_output(output)
            .map_err(|e| ChainError::decode(function_name.to_string(), e.to_string()))
    }

    /// Topic0 of an event
    pub fn event_topic(abi: &Abi, event_name: &str) -> Result<H256> {
        let event = abi
            .event(event_name)
            .map_err(|e| ChainError::Abi(format!("Event {} not found in ABI: {}", event_name, e)))?;
        Ok(event.signature())
    }

    /// Decode a log into `(param name, value)` pairs
    pub fn decode_event(abi: &Abi, event_name: &str, log: &Log) -> Result<Vec<(String, Token)>> {
        let event = abi
            .event(event_name)
            .map_err(|e| ChainError::Abi(format!("Event {} not found in ABI: {}", event_name, e)))?;

        let parsed = event
            .parse_log(RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            })
            .map_err(|e| ChainError::decode(event_name.to_string(), e.to_string()))?;

        Ok(parsed.params.into_iter().map(|p| (p.name, p.value)).collect())
    }

    /// Named uint parameter of a decoded event
    pub fn event_uint(params: &[(String, Token)], name: &str) -> Result<U256> {
        params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, token)| token_uint(token, name))
            .unwrap_or_else(|| Err(ChainError::decode(name.to_string(), "parameter missing".to_string())))
    }
}

/// Extract a uint from a decoded token
pub fn token_uint(token: &Token, what: &str) -> Result<U256> {
    match token {
        Token::Uint(v) => Ok(*v),
        other => Err(ChainError::decode(what.to_string(), format!("expected uint, got {:?}", other))),
    }
}

/// Extract an address from a decoded token
pub fn token_address(token: &Token, what: &str) -> Result<Address> {
    match token {
        Token::Address(a) => Ok(*a),
        other => Err(ChainError::decode(what.to_string(), format!("expected address, got {:?}", other))),
    }
}

/// Extract a bool from a decoded token
pub fn token_bool(token: &Token, what: &str) -> Result<bool> {
    match token {
        Token::Bool(b) => Ok(*b),
        other => Err(ChainError::decode(what.to_string(), format!("expected bool, got {:?}", other))),
    }
}

/// Extract a string from a decoded token
pub fn token_string(token: &Token, what: &str) -> Result<String> {
    match token {
        Token::String(s) => Ok(s.clone()),
        other => Err(ChainError::decode(what.to_string(), format!("expected string, got {:?}", other))),
    }
}

/// Builders for the state-changing calls the restaker submits
pub struct StakingCalls;

impl StakingCalls {
    /// `restakeRewards()` on a single-token pool
    pub fn restake_rewards(pool: Address) -> Result<ContractCall> {
        let data = AbiManager::encode_function_call(&STAKING_POOL_ABI, "restakeRewards", &[])?;
        Ok(ContractCall::new("restake rewards", pool, data))
    }

    /// `claimPendingRewards()` on a pool
    pub fn claim_pending_rewards(pool: Address) -> Result<ContractCall> {
        let data = AbiManager::encode_function_call(&STAKING_POOL_ABI, "claimPendingRewards", &[])?;
        Ok(ContractCall::new("claim rewards", pool, data))
    }

    /// `stake(amount)` on a pool
    pub fn stake(pool: Address, amount: U256) -> Result<ContractCall> {
        let data = AbiManager::encode_function_call(&STAKING_POOL_ABI, "stake", &[Token::Uint(amount)])?;
        Ok(ContractCall::new("stake", pool, data))
    }

    /// Swap an exact amount of native token along `path`
    pub fn swap_exact_native_for_tokens(
        router: Address,
        native_in: U256,
        amount_out_min: U256,
        path: Vec<Address>,
        to: Address,
        deadline: u64,
    ) -> Result<ContractCall> {
        let data = AbiManager::encode_function_call(
            &ROUTER_ABI,
            "swapExactRONForTokens",
            &[
                Token::Uint(amount_out_min),
                Token::Array(path.into_iter().map(Token::Address).collect()),
                Token::Address(to),
                Token::Uint(U256::from(deadline)),
            ],
        )?;
        Ok(ContractCall::new("swap", router, data).with_value(native_in))
    }

    /// Provide `token_amount` of `token` plus native value as liquidity
    pub fn add_liquidity_native(
        router: Address,
        token: Address,
        token_amount: U256,
        native_value: U256,
        native_min: U256,
        to: Address,
        deadline: u64,
    ) -> Result<ContractCall> {
        let data = AbiManager::encode_function_call(
            &ROUTER_ABI,
            "addLiquidityRON",
            &[
                Token::Address(token),
                Token::Uint(token_amount),
                Token::Uint(token_amount),
                Token::Uint(native_min),
                Token::Address(to),
                Token::Uint(U256::from(deadline)),
            ],
        )?;
        Ok(ContractCall::new("add liquidity", router, data).with_value(native_value))
    }
}
