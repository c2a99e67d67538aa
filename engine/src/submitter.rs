//! Transaction submission
//!
//! One submission walks `Built -> Signed -> Submitted` and then ends in
//! `Confirmed`, `Reverted` or `ReceiptTimeout`. Building, signing and
//! broadcasting happen under a process-wide lock scoped to the wallet so
//! two submissions never race for the same nonce; the receipt wait runs
//! outside the lock.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ethers::abi::{Abi, Token};
use ethers::types::{transaction::eip2718::TypedTransaction, Address, TransactionRequest, H256, U256};
use once_cell::sync::Lazy;
use restaker_chain::{AbiManager, BlockRef, ContractCall, LedgerClient, TransactionSigner, TxReceipt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{RestakerError, Result, RetryPolicy};

/// Nonce locks, one per wallet address
static WALLET_LOCKS: Lazy<DashMap<Address, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

/// The submission lock of `wallet`
pub fn wallet_lock(wallet: Address) -> Arc<Mutex<()>> {
    WALLET_LOCKS
        .entry(wallet)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Stage of a transaction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Built,
    Signed,
    Submitted,
    Confirmed,
    Reverted,
    ReceiptTimeout,
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AttemptState::Built => "built",
            AttemptState::Signed => "signed",
            AttemptState::Submitted => "submitted",
            AttemptState::Confirmed => "confirmed",
            AttemptState::Reverted => "reverted",
            AttemptState::ReceiptTimeout => "receipt_timeout",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct SubmitterSettings {
    /// Added to the gas estimate, capped at the block gas limit
    pub gas_buffer: u64,

    pub receipt_poll: RetryPolicy,

    /// Unbounded when `None`
    pub receipt_max_wait: Option<Duration>,
}

impl Default for SubmitterSettings {
    fn default() -> Self {
        Self {
            gas_buffer: 100_000,
            receipt_poll: RetryPolicy::default_receipt_poll(),
            receipt_max_wait: None,
        }
    }
}

/// Builds, signs, broadcasts and confirms transactions for one wallet
#[derive(Clone)]
pub struct TransactionSubmitter {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn TransactionSigner>,
    settings: SubmitterSettings,
}

impl TransactionSubmitter {
    pub fn new(ledger: Arc<dyn LedgerClient>, signer: Arc<dyn TransactionSigner>, settings: SubmitterSettings) -> Self {
        Self {
            ledger,
            signer,
            settings,
        }
    }

    pub fn wallet(&self) -> Address {
        self.signer.address()
    }

    /// Gas price to pay: zero while the sponsor still covers this wallet
    async fn current_gas_price(&self) -> Result<U256> {
        let free_requests = self.ledger.free_gas_requests(self.wallet()).await?;
        if free_requests > 0 {
            debug!(free_requests, "Using sponsored gas");
            return Ok(U256::zero());
        }
        Ok(self.ledger.gas_price().await?)
    }

    /// Assemble a transaction with a fresh nonce, gas price and gas limit
    pub async fn build(&self, call: &ContractCall) -> Result<TypedTransaction> {
        let wallet = self.wallet();
        let gas_price = self.current_gas_price().await?;
        let nonce = self.ledger.transaction_count(wallet).await?;

        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(wallet)
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .gas_price(gas_price)
            .nonce(nonce)
            .into();

        let estimated = self.ledger.estimate_gas(&tx).await?;
        let block_limit = self.ledger.block(BlockRef::Latest).await?.gas_limit;
        if estimated > block_limit {
            return Err(RestakerError::GasLimitExceeded {
                estimated,
                block_limit,
            });
        }

        let gas = (estimated + U256::from(self.settings.gas_buffer)).min(block_limit);
        tx.set_gas(gas);

        debug!(
            operation = call.label,
            state = %AttemptState::Built,
            nonce = %nonce,
            gas = %gas,
            gas_price = %gas_price,
            "Transaction built"
        );
        Ok(tx)
    }

    /// Build, sign and broadcast `call` under the wallet lock
    pub async fn broadcast(&self, call: &ContractCall) -> Result<H256> {
        let lock = wallet_lock(self.wallet());
        let _guard = lock.lock().await;

        let tx = self.build(call).await?;
        let raw = self.signer.sign(&tx).await?;
        debug!(operation = call.label, state = %AttemptState::Signed, "Transaction signed");

        let tx_hash = self.ledger.send_raw_transaction(raw).await?;
        info!(operation = call.label, state = %AttemptState::Submitted, tx_hash = ?tx_hash, "Transaction submitted");
        Ok(tx_hash)
    }

    /// Submit `call` and wait for its successful receipt
    pub async fn submit(&self, call: &ContractCall) -> Result<TxReceipt> {
        let tx_hash = self.broadcast(call).await?;
        self.wait_for_receipt(tx_hash, call.label).await
    }

    /// Poll for the receipt of `tx_hash` on the configured schedule.
    ///
    /// Poll errors are swallowed; only a receipt ends the wait, unless a
    /// maximum wait is configured.
    pub async fn wait_for_receipt(&self, tx_hash: H256, operation: &str) -> Result<TxReceipt> {
        let mut waited = Duration::ZERO;

        for delay in self.settings.receipt_poll.schedule() {
            if let Some(max_wait) = self.settings.receipt_max_wait {
                if waited >= max_wait {
                    warn!(operation, tx_hash = ?tx_hash, state = %AttemptState::ReceiptTimeout, waited_secs = waited.as_secs(), "Receipt wait exhausted");
                    return Err(RestakerError::ReceiptTimeout {
                        tx_hash,
                        waited_secs: waited.as_secs(),
                    });
                }
            }

            tokio::time::sleep(delay).await;
            waited += delay;

            match self.ledger.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Self::settle(receipt, operation),
                Ok(None) => debug!(operation, tx_hash = ?tx_hash, "Receipt not available yet"),
                Err(e) => debug!(operation, tx_hash = ?tx_hash, error = %e, "Receipt poll failed"),
            }
        }

        Err(RestakerError::internal("receipt poll schedule ended"))
    }

    /// Query the receipt once; `None` while it is not available
    pub async fn receipt_once(&self, tx_hash: H256, operation: &str) -> Result<Option<TxReceipt>> {
        match self.ledger.transaction_receipt(tx_hash).await? {
            Some(receipt) => Self::settle(receipt, operation).map(Some),
            None => Ok(None),
        }
    }

    /// Price paid per gas unit: the receipt's effective price, else the one the
    /// transaction was sent with
    pub async fn paid_gas_price(&self, receipt: &TxReceipt) -> Result<Option<U256>> {
        match receipt.effective_gas_price {
            Some(price) => Ok(Some(price)),
            None => Ok(self.ledger.transaction_gas_price(receipt.tx_hash).await?),
        }
    }

    fn settle(receipt: TxReceipt, operation: &str) -> Result<TxReceipt> {
        if !receipt.status {
            warn!(operation, tx_hash = ?receipt.tx_hash, state = %AttemptState::Reverted, gas_used = %receipt.gas_used, "Transaction reverted");
            return Err(RestakerError::ExecutionReverted {
                operation: operation.to_string(),
                tx_hash: receipt.tx_hash,
            });
        }

        info!(operation, tx_hash = ?receipt.tx_hash, state = %AttemptState::Confirmed, gas_used = %receipt.gas_used, "Transaction confirmed");
        Ok(receipt)
    }
}

/// Decode the one `event` log `emitter` left in `receipt`
pub fn single_log(
    receipt: &TxReceipt,
    emitter: Address,
    abi: &Abi,
    event: &str,
    operation: &str,
) -> Result<Vec<(String, Token)>> {
    let topic = AbiManager::event_topic(abi, event)?;
    let mut logs = receipt
        .logs
        .iter()
        .filter(|log| log.address == emitter && log.topics.first() == Some(&topic));

    let log = match (logs.next(), logs.next()) {
        (Some(log), None) => log,
        (None, _) => return Err(RestakerError::receipt_log(operation, "no log found")),
        (Some(_), Some(_)) => return Err(RestakerError::receipt_log(operation, "more than one log found")),
    };

    Ok(AbiManager::decode_event(abi, event, log)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::encode;
    use ethers::types::{Bytes, Log};
    use restaker_chain::contracts::STAKING_POOL_ABI;

    fn reward_log(emitter: Address, amount: u64) -> Log {
        let topic = AbiManager::event_topic(&STAKING_POOL_ABI, "RewardClaimed").unwrap();
        Log {
            address: emitter,
            topics: vec![topic, H256::from(Address::repeat_byte(7))],
            data: Bytes::from(encode(&[Token::Uint(U256::from(amount))])),
            ..Default::default()
        }
    }

    fn receipt(logs: Vec<Log>) -> TxReceipt {
        TxReceipt {
            tx_hash: H256::repeat_byte(1),
            status: true,
            gas_used: U256::from(21_000u64),
            effective_gas_price: None,
            logs,
        }
    }

    #[test]
    fn test_single_log() {
        let pool = Address::repeat_byte(0xaa);
        let other = Address::repeat_byte(0xbb);
        let rec = receipt(vec![reward_log(other, 1), reward_log(pool, 42)]);

        let params = single_log(&rec, pool, &STAKING_POOL_ABI, "RewardClaimed", "restake").unwrap();
        assert_eq!(AbiManager::event_uint(&params, "_amount").unwrap(), U256::from(42u64));
    }

    #[test]
    fn test_single_log_missing_and_duplicated() {
        let pool = Address::repeat_byte(0xaa);

        let err = single_log(&receipt(vec![]), pool, &STAKING_POOL_ABI, "RewardClaimed", "restake").unwrap_err();
        assert!(err.to_string().contains("no log found"));

        let rec = receipt(vec![reward_log(pool, 1), reward_log(pool, 2)]);
        let err = single_log(&rec, pool, &STAKING_POOL_ABI, "RewardClaimed", "restake").unwrap_err();
        assert!(err.to_string().contains("more than one log found"));
    }

    #[test]
    fn test_wallet_lock_is_shared_per_address() {
        let a = wallet_lock(Address::repeat_byte(0x42));
        let b = wallet_lock(Address::repeat_byte(0x42));
        let c = wallet_lock(Address::repeat_byte(0x43));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
