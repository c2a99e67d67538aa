//! Restaker - main entry point
//!
//! Watches one staking position and compounds its rewards when it pays off.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Arg, Command};
use tokio::signal;
use tracing::{error, info};

use restaker::logging::{default_log_file, init_logging};
use restaker::{
    BalanceGuard, FeeEstimator, GainRateEstimator, LoopComponents, LoopSettings, PositionKind, PriceOracle,
    RestakeDecisionLoop, RestakeGasEstimator, Restaker, RestakerConfig, StrategyKind, Strategy, SubmitterSettings,
    TransactionSubmitter, VERSION,
};
use restaker_chain::signer::wallet_from_key;
use restaker_chain::{
    ChainView, CoinGeckoPriceFeed, ExplorerGasHistory, LedgerClient, RpcLedger, StakingChainView, TransactionSigner,
};

const PRIVATE_KEY_ENV: &str = "RESTAKER_PRIVATE_KEY";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let matches = Command::new("restaker")
        .version(VERSION)
        .about("Restaker - compounds staking rewards at the optimal interval")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (YAML)"),
        )
        .arg(
            Arg::new("strategy")
                .short('s')
                .long("strategy")
                .value_name("STRATEGY")
                .help("Override the strategy (optimal_interval, immediate)"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("OUTPUT")
                .help("Generate example config and exit"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .get_matches();

    // Handle config generation
    if let Some(output_path) = matches.get_one::<String>("generate-config") {
        init_logging("info", None)?;
        RestakerConfig::default().save_to_file(output_path)?;
        info!("Generated example config at: {}", output_path);
        return Ok(());
    }

    // Load configuration
    let mut config = match matches.get_one::<String>("config") {
        Some(config_path) => RestakerConfig::from_file(config_path)?,
        None => RestakerConfig::load()?,
    };
    if let Some(strategy) = matches.get_one::<String>("strategy") {
        config.strategy.kind = strategy.parse::<StrategyKind>().map_err(anyhow::Error::msg)?;
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }
    config.validate()?;

    let private_key = std::env::var(PRIVATE_KEY_ENV)
        .with_context(|| format!("{} must hold the wallet private key", PRIVATE_KEY_ENV))?;
    let wallet = wallet_from_key(&private_key, config.chain.chain_id)?;
    drop(private_key);

    // Ledger access
    let ledger: Arc<dyn LedgerClient> = Arc::new(RpcLedger::connect(
        &config.chain.rpc_url,
        config.chain.sponsor_rpc_url.as_deref(),
        config.request_timeout(),
    )?);
    let chain: Arc<dyn ChainView> = Arc::new(StakingChainView::new(
        ledger.clone(),
        config.chain.multicall_address,
        config.position.pool_address,
        config.chain.staking_manager_address,
        config.chain.wrapped_native_address,
    ));

    let tokens = chain
        .pool_tokens(config.position.kind == PositionKind::LiquidityPair)
        .await
        .context("Failed to resolve pool tokens")?;

    let log_file = PathBuf::from(
        config
            .logging
            .file
            .clone()
            .unwrap_or_else(|| default_log_file(&tokens.staking_token.symbol)),
    );
    init_logging(&config.logging.level, Some(&log_file))?;

    let signer: Arc<dyn TransactionSigner> = Arc::new(wallet);

    info!(version = VERSION, "##### Restaker #####");
    info!("Strategy: {}", config.strategy.kind);
    info!("Staking pool: {} ({:?})", tokens.staking_token.symbol, config.position.pool_address);
    info!("Position kind: {}", config.position.kind);
    info!("Wallet: {:?}", signer.address());

    // Restake execution
    let gas_history = Arc::new(ExplorerGasHistory::new(&config.fees.explorer_url, config.request_timeout())?);
    let gas = RestakeGasEstimator::new(
        gas_history,
        config.position.pool_address,
        config.chain.router_address,
        config.fees.gas_history_samples,
    );
    let submitter = TransactionSubmitter::new(
        ledger,
        signer,
        SubmitterSettings {
            gas_buffer: config.fees.gas_buffer,
            receipt_poll: config.schedule.receipt_poll_policy()?,
            receipt_max_wait: config.schedule.receipt_max_wait(),
        },
    );
    let restaker = Restaker::new(
        config.position.kind,
        submitter,
        chain.clone(),
        gas,
        tokens.clone(),
        config.position.pool_address,
        config.chain.router_address,
        config.swap.clone(),
        config.fees.swap_fee,
    )?;

    // Decision loop
    let feed = Arc::new(CoinGeckoPriceFeed::new(
        &config.prices.base_url,
        &config.prices.platform,
        config.request_timeout(),
    )?);
    let components = LoopComponents {
        chain: chain.clone(),
        restaker,
        prices: PriceOracle::new(feed, chain.clone(), tokens.clone()),
        gain: GainRateEstimator::new(chain, tokens.reward_token.decimals, tokens.staking_token.decimals),
        fees: FeeEstimator::new(config.fees.swap_fee),
        guard: BalanceGuard::new(config.schedule.low_balance_cooldown()),
        strategy: Strategy::new(config.strategy.kind),
    };
    let settings = LoopSettings {
        window_blocks: config.gain.window_blocks,
        min_reserve_balance: config.strategy.min_reserve_balance,
        retry: config.schedule.retry_policy()?,
        max_cycle_sleep: config.schedule.max_cycle_sleep(),
        post_restake_sleep: config.schedule.post_restake_sleep(),
        verification_abandon_after: config.schedule.verification_abandon_after,
    };
    let mut decision_loop = RestakeDecisionLoop::new(components, settings);

    info!("🚀 Restaker running");

    tokio::select! {
        result = decision_loop.run() => {
            if let Err(e) = result {
                error!(kind = %e.kind(), error = %e, "Restaker stopped on fatal error");
                return Err(e.into());
            }
        }
        _ = setup_shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("Restaker stopped");
    Ok(())
}

/// Set up graceful shutdown signal handling
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
