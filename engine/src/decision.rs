//! The restake decision loop
//!
//! Each cycle snapshots the position, prices the restake, asks the strategy
//! whether to act and either restakes or sleeps. Errors never escape a cycle
//! except fatal ones; everything else is logged and retried after the
//! backoff the outer [`RetryPolicy`] prescribes for the current attempt.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, H256};
use restaker_chain::{to_units, ChainView, PositionSnapshot};
use tracing::{error, info, warn};

use crate::error::ErrorKind;
use crate::fees::FeeEstimator;
use crate::gain::{apr_percent, GainRateEstimator};
use crate::guard::BalanceGuard;
use crate::prices::PriceOracle;
use crate::restaker::Restaker;
use crate::strategy::{CycleInputs, Strategy};
use crate::{RestakeDecision, RestakeReport, RestakerError, Result, RetryPolicy};

const SECS_PER_DAY: f64 = 86_400.0;

/// Coarse state of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Deciding,

    /// A broadcast transaction whose receipt never arrived
    VerifyingLastSubmission(H256),
}

/// What a cycle ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum CycleAction {
    /// Reserve could not cover twice the fee estimate
    LowBalance { fee_native: f64, reserve_native: f64 },
    Restaked(RestakeReport),
    WaitingForClaimWindow,
    CannotRestakeYet,
    Waiting,
    Verified { tx_hash: H256 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub action: CycleAction,
    pub sleep: Duration,
}

/// Timing and policy knobs of the loop
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub window_blocks: u64,

    /// Native balance, in whole units, the wallet should keep
    pub min_reserve_balance: f64,

    pub retry: RetryPolicy,
    pub max_cycle_sleep: Duration,
    pub post_restake_sleep: Duration,
    pub verification_abandon_after: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            window_blocks: 28_800,
            min_reserve_balance: 0.0,
            retry: RetryPolicy::default_outer(),
            max_cycle_sleep: Duration::from_secs(86_400),
            post_restake_sleep: Duration::from_secs(86_400),
            verification_abandon_after: 10,
        }
    }
}

/// Collaborators of the decision loop
pub struct LoopComponents {
    pub chain: Arc<dyn ChainView>,
    pub restaker: Restaker,
    pub prices: PriceOracle,
    pub gain: GainRateEstimator,
    pub fees: FeeEstimator,
    pub guard: BalanceGuard,
    pub strategy: Strategy,
}

/// Drives one monitored position forever
pub struct RestakeDecisionLoop {
    chain: Arc<dyn ChainView>,
    restaker: Restaker,
    prices: PriceOracle,
    gain: GainRateEstimator,
    fees: FeeEstimator,
    guard: BalanceGuard,
    strategy: Strategy,
    settings: LoopSettings,
    wallet: Address,
    state: LoopState,
    attempts: usize,
}

impl RestakeDecisionLoop {
    pub fn new(components: LoopComponents, settings: LoopSettings) -> Self {
        let wallet = components.restaker.submitter().wallet();
        Self {
            chain: components.chain,
            restaker: components.restaker,
            prices: components.prices,
            gain: components.gain,
            fees: components.fees,
            guard: components.guard,
            strategy: components.strategy,
            settings,
            wallet,
            state: LoopState::Deciding,
            attempts: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Run cycles until a fatal error
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.run_cycle().await {
                Ok(outcome) => {
                    self.attempts = 0;
                    info!("Sleeping for {:.2} days...", outcome.sleep.as_secs_f64() / SECS_PER_DAY);
                    tokio::time::sleep(outcome.sleep).await;
                }
                Err(e) => {
                    let backoff = self.handle_error(e)?;
                    info!(attempt = self.attempts, "Retrying in {}s", backoff.as_secs());
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// One cycle in the current state
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        match self.state {
            LoopState::Deciding => self.decide().await,
            LoopState::VerifyingLastSubmission(tx_hash) => self.verify(tx_hash).await,
        }
    }

    /// Log `e` and pick the backoff before the next attempt; fatal errors are returned
    pub fn handle_error(&mut self, e: RestakerError) -> Result<Duration> {
        let kind = e.kind();
        error!(kind = %kind, category = e.category(), error = %e, attempt = self.attempts, "Cycle failed");

        if kind == ErrorKind::Fatal {
            if e.is_convergence_failure() {
                error!(error = %e, "Numeric precondition violated, stopping");
            }
            return Err(e);
        }

        let backoff = self.settings.retry.delay_for(self.attempts);
        self.attempts += 1;

        match (&e, self.state) {
            (RestakerError::ReceiptTimeout { tx_hash, .. }, LoopState::Deciding) => {
                warn!(tx_hash = ?tx_hash, "Submission unconfirmed, verifying it before deciding again");
                self.state = LoopState::VerifyingLastSubmission(*tx_hash);
                self.attempts = 0;
            }
            (RestakerError::ExecutionReverted { .. }, LoopState::VerifyingLastSubmission(_)) => {
                self.state = LoopState::Deciding;
                self.attempts = 0;
            }
            _ => {}
        }

        if let LoopState::VerifyingLastSubmission(tx_hash) = self.state {
            if self.attempts >= self.settings.verification_abandon_after as usize {
                warn!(tx_hash = ?tx_hash, attempts = self.attempts, "Abandoning verification of last submission");
                self.state = LoopState::Deciding;
                self.attempts = 0;
            }
        }

        Ok(backoff)
    }

    async fn verify(&mut self, tx_hash: H256) -> Result<CycleOutcome> {
        let receipt = self
            .restaker
            .submitter()
            .receipt_once(tx_hash, "last submission")
            .await?
            .ok_or(RestakerError::ReceiptTimeout {
                tx_hash,
                waited_secs: 0,
            })?;

        let gas_price = match self.restaker.submitter().paid_gas_price(&receipt).await {
            Ok(price) => price,
            Err(e) => {
                warn!(tx_hash = ?tx_hash, error = %e, "Gas price of last submission unavailable");
                None
            }
        };
        let native = &self.restaker.tokens().native_token;
        let fee = gas_price.map(|price| to_units(price.saturating_mul(receipt.gas_used), native.decimals));
        info!(
            tx_hash = ?tx_hash,
            gas_used = %receipt.gas_used,
            "Last submission confirmed (gas fee: {} {})",
            fee.map(|f| f.to_string()).unwrap_or_else(|| "unknown".to_string()),
            native.symbol
        );

        self.state = LoopState::Deciding;
        Ok(CycleOutcome {
            action: CycleAction::Verified { tx_hash },
            sleep: Duration::ZERO,
        })
    }

    async fn decide(&mut self) -> Result<CycleOutcome> {
        let tokens = self.restaker.tokens().clone();
        let position = self.chain.position(self.wallet).await?;
        let prices = self.prices.snapshot().await?;

        let gain_rate = self
            .gain
            .trailing(position.block_number, self.settings.window_blocks, prices.reward_to_staking_ratio())
            .await?;
        info!("Estimated APR: {:.2}%", apr_percent(gain_rate));

        let staked = to_units(position.staked_amount, tokens.staking_token.decimals);
        let staked_native = staked * prices.staking_in_native();
        info!(
            "Staked amount: {} {} ({} USD)",
            staked,
            tokens.staking_token.symbol,
            staked * prices.staking_token_usd
        );

        let pending = to_units(position.pending_reward, tokens.reward_token.decimals);
        let reward_native = pending * prices.reward_in_native();
        info!(
            "Claimable rewards: {} {} ({} USD)",
            pending,
            tokens.reward_token.symbol,
            pending * prices.reward_token_usd
        );

        let gas_price_native = to_units(self.chain.gas_price().await?, tokens.native_token.decimals);
        let gas_units = self.restaker.estimate_gas().await?;
        let fee = self
            .fees
            .estimate(gas_units, gas_price_native, reward_native, self.restaker.kind());
        info!(
            "Estimated gas to restake: {} ({} USD)",
            gas_units,
            fee.gas_cost_native() * prices.native_token_usd
        );

        let reserve_native = to_units(self.chain.native_balance(self.wallet).await?, tokens.native_token.decimals);
        if self.guard.check(&fee, reserve_native) {
            warn!(
                kind = %ErrorKind::ResourceInsufficient,
                "{} balance too low: {} available, {} estimated fees. Top up at least {} {}",
                tokens.native_token.symbol,
                reserve_native,
                fee.total_native,
                self.guard.minimum_top_up(fee.total_native, reserve_native),
                tokens.native_token.symbol
            );
            return Ok(CycleOutcome {
                action: CycleAction::LowBalance {
                    fee_native: fee.total_native,
                    reserve_native,
                },
                sleep: self.guard.cooldown(),
            });
        }

        let mut usable_reserve_native = reserve_native - self.settings.min_reserve_balance;
        if self.restaker.kind().reward_credited_to_reserve() {
            usable_reserve_native += reward_native;
        }

        let decision = self.strategy.decide(&CycleInputs {
            pending_reward_native: reward_native,
            staked_native,
            fee,
            gain_rate,
            usable_reserve_native,
        })?;

        match decision {
            RestakeDecision::Act => self.act(&position, gas_units).await,
            RestakeDecision::WaitUntil(wait) => {
                info!("Remaining time to restake: {:.2} days", wait.as_secs_f64() / SECS_PER_DAY);
                Ok(CycleOutcome {
                    action: CycleAction::Waiting,
                    sleep: wait.min(self.settings.max_cycle_sleep),
                })
            }
        }
    }

    async fn act(&self, position: &PositionSnapshot, gas_estimated: u64) -> Result<CycleOutcome> {
        if position.can_claim {
            info!("Restaking...");
            let report = self.restaker.restake().await?;
            info!("Total gas used: {}", report.gas_used);
            if gas_estimated > 0 {
                let used = report.gas_used.low_u64() as f64;
                let estimated = gas_estimated as f64;
                info!("Gas estimation error: {:.2}%", 100.0 * (used - estimated) / estimated);
            }
            return Ok(CycleOutcome {
                action: CycleAction::Restaked(report),
                sleep: self.settings.post_restake_sleep,
            });
        }

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let since_last_claim = now.saturating_sub(position.last_claim_timestamp);
        if since_last_claim < position.min_claim_window {
            let remaining = Duration::from_secs(position.min_claim_window - since_last_claim);
            info!(
                "Remaining time to be allowed to restake: {:.2} days",
                remaining.as_secs_f64() / SECS_PER_DAY
            );
            return Ok(CycleOutcome {
                action: CycleAction::WaitingForClaimWindow,
                sleep: remaining,
            });
        }

        warn!("Can not restake yet and the claim window has passed");
        Ok(CycleOutcome {
            action: CycleAction::CannotRestakeYet,
            sleep: self.settings.max_cycle_sleep,
        })
    }
}
