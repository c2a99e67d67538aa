//! JSON-RPC ledger client
//!
//! [`LedgerClient`] is the raw ledger surface the rest of the restaker is
//! written against. [`RpcLedger`] is the production implementation over an
//! `ethers` HTTP provider, optionally paired with a sponsored-gas endpoint
//! that relays transactions for free while the wallet has quota left.

use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, BlockNumber, Bytes, H256, U256};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::{BlockHeader, BlockRef, ChainError, Result, TxReceipt};

/// Raw ledger access
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    async fn block(&self, block: BlockRef) -> Result<BlockHeader>;

    async fn balance(&self, address: Address) -> Result<U256>;

    async fn gas_price(&self) -> Result<U256>;

    async fn transaction_count(&self, address: Address) -> Result<U256>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256>;

    /// Read-only call, optionally pinned to a block
    async fn call(&self, tx: &TypedTransaction, block: Option<u64>) -> Result<Bytes>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;

    /// `None` while the node does not know the transaction yet
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TxReceipt>>;

    /// Gas price the transaction was sent with; `None` if the node does not know it
    async fn transaction_gas_price(&self, hash: H256) -> Result<Option<U256>>;

    /// Remaining sponsored transactions for `address`
    async fn free_gas_requests(&self, _address: Address) -> Result<u64> {
        Ok(0)
    }
}

/// HTTP JSON-RPC ledger client
#[derive(Debug, Clone)]
pub struct RpcLedger {
    provider: Provider<Http>,

    /// Sponsored-gas relay, used for broadcasting and quota lookups
    sponsor: Option<Provider<Http>>,
}

impl RpcLedger {
    /// Connect to `rpc_url`, with an optional sponsored-gas relay
    pub fn connect(rpc_url: &str, sponsor_url: Option<&str>, timeout: Duration) -> Result<Self> {
        info!(url = rpc_url, sponsored = sponsor_url.is_some(), "Initializing ledger client");

        let provider = Self::http_provider(rpc_url, timeout)?;
        let sponsor = sponsor_url
            .map(|url| Self::http_provider(url, timeout))
            .transpose()?;

        Ok(Self { provider, sponsor })
    }

    fn http_provider(url: &str, timeout: Duration) -> Result<Provider<Http>> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Provider::<Http>::new(Http::new_with_client(
            Url::parse(url)?,
            http_client,
        )))
    }

    /// Endpoint transactions are broadcast through
    fn broadcaster(&self) -> &Provider<Http> {
        self.sponsor.as_ref().unwrap_or(&self.provider)
    }

    fn block_id(block: BlockRef) -> BlockId {
        match block {
            BlockRef::Latest => BlockId::Number(BlockNumber::Latest),
            BlockRef::Number(n) => BlockId::Number(BlockNumber::Number(n.into())),
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    async fn block(&self, block: BlockRef) -> Result<BlockHeader> {
        let found = self
            .provider
            .get_block(Self::block_id(block))
            .await?
            .ok_or_else(|| ChainError::MissingBlock(block.to_string()))?;

        let number = found
            .number
            .ok_or_else(|| ChainError::MissingBlock(format!("{} (pending)", block)))?;

        Ok(BlockHeader {
            number: number.as_u64(),
            timestamp: found.timestamp.low_u64(),
            gas_limit: found.gas_limit,
        })
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address, None).await?)
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn transaction_count(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_transaction_count(address, None).await?)
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        Ok(self.provider.estimate_gas(tx, None).await?)
    }

    async fn call(&self, tx: &TypedTransaction, block: Option<u64>) -> Result<Bytes> {
        let block = block.map(|n| Self::block_id(BlockRef::Number(n)));
        Ok(self.provider.call(tx, block).await?)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = self.broadcaster().send_raw_transaction(raw).await?;
        let hash = pending.tx_hash();
        debug!(tx_hash = ?hash, "Raw transaction broadcast");
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TxReceipt>> {
        let receipt = self.broadcaster().get_transaction_receipt(hash).await?;
        Ok(receipt.map(TxReceipt::from))
    }

    async fn transaction_gas_price(&self, hash: H256) -> Result<Option<U256>> {
        let tx = self.broadcaster().get_transaction(hash).await?;
        Ok(tx.and_then(|tx| tx.gas_price))
    }

    async fn free_gas_requests(&self, address: Address) -> Result<u64> {
        let Some(sponsor) = &self.sponsor else {
            return Ok(0);
        };

        let value: Value = sponsor
            .request("eth_getFreeGasRequests", [format!("{:?}", address)])
            .await?;

        match parse_quota(&value) {
            Some(quota) => Ok(quota),
            None => {
                warn!(response = %value, "Unexpected free gas quota response");
                Err(ChainError::decode(
                    "eth_getFreeGasRequests".to_string(),
                    format!("unexpected response {}", value),
                ))
            }
        }
    }
}

/// The relay answers with either a JSON number or a hex quantity
fn parse_quota(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let digits = s.trim_start_matches("0x");
            if s.starts_with("0x") {
                u64::from_str_radix(digits, 16).ok()
            } else {
                digits.parse().ok()
            }
        }
        Value::Null => Some(0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_quota_forms() {
        assert_eq!(parse_quota(&json!(12)), Some(12));
        assert_eq!(parse_quota(&json!("0x1f")), Some(31));
        assert_eq!(parse_quota(&json!("7")), Some(7));
        assert_eq!(parse_quota(&Value::Null), Some(0));
        assert_eq!(parse_quota(&json!({"quota": 1})), None);
    }

    #[test]
    fn test_connect_rejects_bad_url() {
        let result = RpcLedger::connect("not a url", None, Duration::from_secs(5));
        assert!(matches!(result, Err(ChainError::Url(_))));
    }

    #[test]
    fn test_broadcaster_prefers_sponsor() {
        let ledger = RpcLedger::connect(
            "http://localhost:8545",
            Some("http://localhost:8546"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(ledger.broadcaster().url().as_str().contains("8546"));
    }
}
