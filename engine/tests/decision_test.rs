//! Decision loop cycles over stubbed chain state

mod common;

use std::sync::Arc;
use std::time::Duration;

use ethers::types::H256;
use restaker::{CycleAction, LoopSettings, LoopState, RestakerError, StrategyKind};
use restaker_chain::ChainError;
use tokio_test::{assert_err, assert_ok};

use common::*;

fn now() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

fn transient() -> RestakerError {
    RestakerError::Chain(ChainError::Explorer("page short".into()))
}

#[tokio::test]
async fn test_optimal_strategy_waits_for_interval() {
    let ledger = Arc::new(StubLedger::new());
    let chain = Arc::new(StubChain::direct());
    let mut decision_loop = build_loop(ledger.clone(), chain, StrategyKind::OptimalInterval, loop_settings());

    let outcome = assert_ok!(decision_loop.run_cycle().await);

    assert_eq!(outcome.action, CycleAction::Waiting);
    let wait_days = outcome.sleep.as_secs_f64() / DAY;
    assert!((wait_days - 144.7168).abs() < 1e-3, "wait was {wait_days} days");
    assert_eq!(ledger.sent_count(), 0);
}

#[tokio::test]
async fn test_wait_is_clamped_to_max_cycle_sleep() {
    let ledger = Arc::new(StubLedger::new());
    let chain = Arc::new(StubChain::direct());
    let settings = LoopSettings {
        max_cycle_sleep: Duration::from_secs(86_400),
        ..loop_settings()
    };
    let mut decision_loop = build_loop(ledger, chain, StrategyKind::OptimalInterval, settings);

    let outcome = assert_ok!(decision_loop.run_cycle().await);

    assert_eq!(outcome.action, CycleAction::Waiting);
    assert_eq!(outcome.sleep, Duration::from_secs(86_400));
}

#[tokio::test]
async fn test_low_balance_sleeps_for_cooldown() {
    let ledger = Arc::new(StubLedger::new());
    let chain = Arc::new(StubChain::direct());
    chain.set_balance(19);
    let mut decision_loop = build_loop(ledger.clone(), chain, StrategyKind::Immediate, loop_settings());

    let outcome = assert_ok!(decision_loop.run_cycle().await);

    match outcome.action {
        CycleAction::LowBalance {
            fee_native,
            reserve_native,
        } => {
            assert!((fee_native - 10.0).abs() < 1e-9);
            assert!((reserve_native - 19.0).abs() < 1e-9);
        }
        other => panic!("unexpected action: {other:?}"),
    }
    assert_eq!(outcome.sleep, Duration::from_secs(600));
    assert_eq!(ledger.sent_count(), 0);
}

#[tokio::test]
async fn test_immediate_strategy_restakes() {
    let ledger = Arc::new(StubLedger::new());
    ledger.push_receipt(Ok(Some(reward_receipt(ledger.tx_hash, units(10), 90_000))));
    let chain = Arc::new(StubChain::direct());
    let mut decision_loop = build_loop(ledger.clone(), chain, StrategyKind::Immediate, loop_settings());

    let outcome = assert_ok!(decision_loop.run_cycle().await);

    match outcome.action {
        CycleAction::Restaked(report) => {
            assert_eq!(report.restaked_amount, units(10));
            assert_eq!(report.gas_used.as_u64(), 90_000);
        }
        other => panic!("unexpected action: {other:?}"),
    }
    assert_eq!(outcome.sleep, Duration::from_secs(86_400));
    assert_eq!(ledger.sent_count(), 1);
}

#[tokio::test]
async fn test_restake_blocked_by_claim_window() {
    let ledger = Arc::new(StubLedger::new());
    let chain = Arc::new(StubChain::direct());
    chain.update_position(|p| {
        p.can_claim = false;
        p.last_claim_timestamp = now() - 100;
        p.min_claim_window = 3_600;
    });
    let mut decision_loop = build_loop(ledger.clone(), chain, StrategyKind::Immediate, loop_settings());

    let outcome = assert_ok!(decision_loop.run_cycle().await);

    assert_eq!(outcome.action, CycleAction::WaitingForClaimWindow);
    let secs = outcome.sleep.as_secs();
    assert!((3_480..=3_500).contains(&secs), "slept {secs}s");
    assert_eq!(ledger.sent_count(), 0);
}

#[tokio::test]
async fn test_cannot_restake_after_claim_window() {
    let ledger = Arc::new(StubLedger::new());
    let chain = Arc::new(StubChain::direct());
    chain.update_position(|p| p.can_claim = false);
    let settings = loop_settings();
    let max_sleep = settings.max_cycle_sleep;
    let mut decision_loop = build_loop(ledger, chain, StrategyKind::Immediate, settings);

    let outcome = assert_ok!(decision_loop.run_cycle().await);

    assert_eq!(outcome.action, CycleAction::CannotRestakeYet);
    assert_eq!(outcome.sleep, max_sleep);
}

#[tokio::test]
async fn test_backoff_follows_retry_schedule() {
    let mut decision_loop = build_loop(
        Arc::new(StubLedger::new()),
        Arc::new(StubChain::direct()),
        StrategyKind::OptimalInterval,
        loop_settings(),
    );

    let backoffs: Vec<u64> = (0..5)
        .map(|_| decision_loop.handle_error(transient()).unwrap().as_secs())
        .collect();

    assert_eq!(backoffs, vec![5, 5, 60, 60, 60]);
    assert_eq!(decision_loop.attempts(), 5);
    assert_eq!(decision_loop.state(), LoopState::Deciding);
}

#[tokio::test]
async fn test_fatal_error_stops_loop() {
    let mut decision_loop = build_loop(
        Arc::new(StubLedger::new()),
        Arc::new(StubChain::direct()),
        StrategyKind::OptimalInterval,
        loop_settings(),
    );

    let err = decision_loop
        .handle_error(RestakerError::non_convergence(2.0, 1e-8, "fee ratio out of range"))
        .unwrap_err();

    assert!(err.is_convergence_failure());
    assert_eq!(decision_loop.attempts(), 0);
}

#[tokio::test]
async fn test_unconfirmed_submission_is_verified() {
    let ledger = Arc::new(StubLedger::new());
    let tx_hash = H256::repeat_byte(0x55);
    let mut decision_loop = build_loop(
        ledger.clone(),
        Arc::new(StubChain::direct()),
        StrategyKind::OptimalInterval,
        loop_settings(),
    );

    decision_loop.handle_error(transient()).unwrap();
    decision_loop
        .handle_error(RestakerError::ReceiptTimeout {
            tx_hash,
            waited_secs: 900,
        })
        .unwrap();
    assert_eq!(decision_loop.state(), LoopState::VerifyingLastSubmission(tx_hash));
    assert_eq!(decision_loop.attempts(), 0);

    // Not mined yet
    let err = assert_err!(decision_loop.run_cycle().await);
    assert!(matches!(err, RestakerError::ReceiptTimeout { .. }));
    decision_loop.handle_error(err).unwrap();
    assert_eq!(decision_loop.state(), LoopState::VerifyingLastSubmission(tx_hash));

    ledger.push_receipt(Ok(Some(reward_receipt(tx_hash, units(10), 90_000))));
    let outcome = assert_ok!(decision_loop.run_cycle().await);

    assert_eq!(outcome.action, CycleAction::Verified { tx_hash });
    assert_eq!(outcome.sleep, Duration::ZERO);
    assert_eq!(decision_loop.state(), LoopState::Deciding);
}

#[tokio::test]
async fn test_reverted_submission_returns_to_deciding() {
    let ledger = Arc::new(StubLedger::new());
    let tx_hash = H256::repeat_byte(0x56);
    let mut decision_loop = build_loop(
        ledger.clone(),
        Arc::new(StubChain::direct()),
        StrategyKind::OptimalInterval,
        loop_settings(),
    );
    decision_loop
        .handle_error(RestakerError::ReceiptTimeout {
            tx_hash,
            waited_secs: 900,
        })
        .unwrap();

    let mut receipt = reward_receipt(tx_hash, units(10), 90_000);
    receipt.status = false;
    ledger.push_receipt(Ok(Some(receipt)));

    let err = assert_err!(decision_loop.run_cycle().await);
    assert!(matches!(err, RestakerError::ExecutionReverted { .. }));
    decision_loop.handle_error(err).unwrap();

    assert_eq!(decision_loop.state(), LoopState::Deciding);
    assert_eq!(decision_loop.attempts(), 0);
}

#[tokio::test]
async fn test_verification_is_abandoned() {
    let tx_hash = H256::repeat_byte(0x57);
    let mut decision_loop = build_loop(
        Arc::new(StubLedger::new()),
        Arc::new(StubChain::direct()),
        StrategyKind::OptimalInterval,
        loop_settings(),
    );
    decision_loop
        .handle_error(RestakerError::ReceiptTimeout {
            tx_hash,
            waited_secs: 900,
        })
        .unwrap();

    for _ in 0..9 {
        decision_loop.handle_error(transient()).unwrap();
        assert_eq!(decision_loop.state(), LoopState::VerifyingLastSubmission(tx_hash));
    }

    decision_loop.handle_error(transient()).unwrap();
    assert_eq!(decision_loop.state(), LoopState::Deciding);
    assert_eq!(decision_loop.attempts(), 0);
}
