//! # Restaker Chain
//!
//! Ledger access layer for the restaker. Everything the decision engine
//! reads from or sends to the remote ledger goes through the traits
//! defined here:
//!
//! - [`LedgerClient`]: raw JSON-RPC (blocks, balances, nonces, receipts)
//! - [`Multicall`]: batched read-only contract calls
//! - [`ChainView`]: the staking position and pool as the engine sees it
//! - [`PriceFeed`]: USD token prices
//! - [`GasUsageHistory`]: historical gas usage of contract functions
//! - [`TransactionSigner`]: wallet signing

pub mod contracts;
pub mod error;
pub mod gas_history;
pub mod ledger;
pub mod multicall;
pub mod price;
pub mod signer;
pub mod staking;
pub mod types;

pub use contracts::{AbiManager, StakingCalls};
pub use error::{ChainError, Result};
pub use gas_history::{ExplorerGasHistory, GasUsageHistory};
pub use ledger::{LedgerClient, RpcLedger};
pub use multicall::Multicall;
pub use price::{CoinGeckoPriceFeed, PriceFeed};
pub use signer::TransactionSigner;
pub use staking::{ChainView, StakingChainView};
pub use types::*;

/// Current version of the chain layer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
