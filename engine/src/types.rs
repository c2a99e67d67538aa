//! Core types for the restaking engine

use std::time::Duration;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Fractional growth of the position value per second
pub type GainRate = f64;

/// Contract an operation is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractRole {
    StakingPool,
    Router,
}

/// How the staked position is structured, selected once from config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    /// The reward token is the staking token; the pool restakes in one call
    Direct,

    /// The staking token is an LP token of (native, other); rewards are paid
    /// in the native token and half of them is swapped before re-depositing
    LiquidityPair,
}

const DIRECT_OPERATIONS: &[(ContractRole, &str)] = &[(ContractRole::StakingPool, "restakeRewards()")];

const LIQUIDITY_PAIR_OPERATIONS: &[(ContractRole, &str)] = &[
    (ContractRole::StakingPool, "claimPendingRewards()"),
    (ContractRole::Router, "swapExactRONForTokens(uint256,address[],address,uint256)"),
    (ContractRole::Router, "addLiquidityRON(address,uint256,uint256,uint256,address,uint256)"),
    (ContractRole::StakingPool, "stake(uint256)"),
];

impl PositionKind {
    /// Whether restaking swaps part of the reward
    pub fn has_swap_step(&self) -> bool {
        matches!(self, PositionKind::LiquidityPair)
    }

    /// Whether claimed rewards land in the native reserve balance
    pub fn reward_credited_to_reserve(&self) -> bool {
        matches!(self, PositionKind::LiquidityPair)
    }

    /// Operations one restake submits, in order, with their canonical signatures
    pub fn restake_operations(&self) -> &'static [(ContractRole, &'static str)] {
        match self {
            PositionKind::Direct => DIRECT_OPERATIONS,
            PositionKind::LiquidityPair => LIQUIDITY_PAIR_OPERATIONS,
        }
    }
}

impl std::fmt::Display for PositionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionKind::Direct => write!(f, "direct"),
            PositionKind::LiquidityPair => write!(f, "liquidity_pair"),
        }
    }
}

/// Which decision function drives the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    OptimalInterval,
    Immediate,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::OptimalInterval => write!(f, "optimal_interval"),
            StrategyKind::Immediate => write!(f, "immediate"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "optimal_interval" | "optimal" => Ok(StrategyKind::OptimalInterval),
            "immediate" | "asap" => Ok(StrategyKind::Immediate),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

/// USD prices fetched for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSnapshot {
    pub staking_token_usd: f64,
    pub reward_token_usd: f64,
    pub native_token_usd: f64,
}

impl PriceSnapshot {
    /// Value of one reward token in staking tokens
    pub fn reward_to_staking_ratio(&self) -> f64 {
        self.reward_token_usd / self.staking_token_usd
    }

    /// Value of one staking token in native tokens
    pub fn staking_in_native(&self) -> f64 {
        self.staking_token_usd / self.native_token_usd
    }

    /// Value of one reward token in native tokens
    pub fn reward_in_native(&self) -> f64 {
        self.reward_token_usd / self.native_token_usd
    }
}

/// Cost of one restake in native units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeEstimate {
    pub gas_units: u64,
    pub gas_price_native: f64,
    pub swap_fee_native: f64,
    pub total_native: f64,
}

impl FeeEstimate {
    pub fn gas_cost_native(&self) -> f64 {
        self.gas_units as f64 * self.gas_price_native
    }

    /// Copy with `extra` native units added to the total
    pub fn inflated_by(&self, extra: f64) -> Self {
        Self {
            total_native: self.total_native + extra,
            ..*self
        }
    }
}

/// What the strategy wants done this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestakeDecision {
    Act,
    WaitUntil(Duration),
}

/// Outcome of a completed restake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestakeReport {
    /// Gas used by every transaction of the restake
    pub gas_used: U256,

    /// Amount added to the position, in staking token raw units
    pub restaked_amount: U256,
}
