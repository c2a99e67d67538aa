//! # Restaker
//!
//! Automatic compounding of an on-chain staking position.
//!
//! Every cycle the decision loop reads the position through
//! [`restaker_chain`], prices a restake, and asks the configured strategy
//! whether compounding now beats waiting. The optimal interval comes from
//! the growth/cost trade-off solved in [`optimizer`]; restakes are sent
//! through the [`TransactionSubmitter`], which serialises nonces per wallet
//! and waits for receipts on an escalating poll schedule.

pub mod config;
pub mod decision;
pub mod error;
pub mod fees;
pub mod gain;
pub mod guard;
pub mod logging;
pub mod optimizer;
pub mod prices;
pub mod restaker;
pub mod retry;
pub mod strategy;
pub mod submitter;
pub mod types;

pub use crate::config::RestakerConfig;
pub use decision::{CycleAction, CycleOutcome, LoopComponents, LoopSettings, LoopState, RestakeDecisionLoop};
pub use error::{ErrorKind, RestakerError, Result};
pub use fees::{FeeEstimator, RestakeGasEstimator};
pub use gain::GainRateEstimator;
pub use guard::BalanceGuard;
pub use prices::PriceOracle;
pub use restaker::Restaker;
pub use retry::RetryPolicy;
pub use strategy::{CycleInputs, Strategy};
pub use submitter::{AttemptState, SubmitterSettings, TransactionSubmitter};
pub use types::*;

/// Version of the restaker
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
